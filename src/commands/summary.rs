use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use uuid::Uuid;

use super::AppState;
use crate::error::ApiError;

pub const SUMMARY_FILENAME: &str = "medace_summary.txt";

/// `GET /api/sessions/:id/summary`: the current extracted text, or the
/// placeholder when nothing has been extracted.
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session(&id).await?;
    let body = session.lock().await.summary_text().to_string();

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{SUMMARY_FILENAME}\""),
            ),
        ],
        body,
    ))
}
