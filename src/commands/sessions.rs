use axum::extract::State;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use super::AppState;

#[derive(Serialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
    pub chat_available: bool,
}

pub async fn create(State(state): State<AppState>) -> Json<SessionCreated> {
    let session_id = state.sessions.create().await;
    Json(SessionCreated {
        session_id,
        chat_available: state.provider.is_some(),
    })
}
