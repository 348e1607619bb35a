use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::error::ApiError;
use crate::llm::{ChatMessage, ChatRequest, StreamChunk};
use crate::session::TurnOutcome;

/// Shown to the user when a completion fails; the real error is only logged.
pub const GENERIC_CHAT_ERROR: &str = "An error occurred while processing your request.";

pub const DISCLAIMER: &str = "We appreciate your engagement! This AI assistant is designed to provide information on healthcare-related topics like any disease or virus, its symptoms, and preventive measures. It should not replace professional medical advice, diagnosis, or treatment.";

#[derive(Deserialize)]
pub struct ChatSendRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatHistoryView {
    pub disclaimer: &'static str,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum ChatEventPayload {
    Delta { text: String },
    Done { content: String },
    Error { message: &'static str },
}

impl ChatEventPayload {
    fn name(&self) -> &'static str {
        match self {
            ChatEventPayload::Delta { .. } => "delta",
            ChatEventPayload::Done { .. } => "done",
            ChatEventPayload::Error { .. } => "error",
        }
    }

    fn into_event(self) -> Event {
        let name = self.name();
        Event::default()
            .event(name)
            .json_data(&self)
            .unwrap_or_else(|_| Event::default().event(name))
    }
}

/// `POST /api/sessions/:id/chat/open`: the chat panel was opened. A pending
/// report is injected here so the panel shows it straight away.
pub async fn open(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChatHistoryView>, ApiError> {
    let session = state.session(&id).await?;
    let mut session = session.lock().await;
    if session.inject_pending_report() {
        tracing::info!(session = %id, "Report context injected into chat");
    }
    Ok(Json(ChatHistoryView {
        disclaimer: DISCLAIMER,
        messages: session.history().visible(),
    }))
}

/// `GET /api/sessions/:id/chat/messages`
pub async fn messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChatHistoryView>, ApiError> {
    let session = state.session(&id).await?;
    let session = session.lock().await;
    Ok(Json(ChatHistoryView {
        disclaimer: DISCLAIMER,
        messages: session.history().visible(),
    }))
}

/// `POST /api/sessions/:id/chat`: stream the assistant's reply as
/// server-sent events: `delta`* then `done` or `error`.
///
/// The session stays locked until the reply (or apology) is recorded.
pub async fn send(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChatSendRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let prompt = req.message.trim();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("Message cannot be empty".into()));
    }
    let provider = state.provider.clone().ok_or(ApiError::ChatUnavailable)?;
    let session = state.session(&id).await?;

    let mut guard = session.lock_owned().await;
    let request = ChatRequest {
        messages: guard.begin_turn(prompt),
        model: state.chat.model.clone(),
        temperature: state.chat.temperature,
    };

    let (tx, rx) = mpsc::unbounded::<ChatEventPayload>();
    tokio::spawn(async move {
        let delta_tx = tx.clone();
        let result = provider
            .chat_stream(&request, move |chunk: StreamChunk| {
                if !chunk.delta.is_empty() {
                    let _ = delta_tx.unbounded_send(ChatEventPayload::Delta { text: chunk.delta });
                }
            })
            .await;

        if let Err(e) = &result {
            tracing::warn!(session = %id, provider = provider.name(), error = %e, "Chat completion failed");
        }

        let last = match guard.finish_turn(result) {
            TurnOutcome::Answered(content) => ChatEventPayload::Done { content },
            TurnOutcome::Failed => ChatEventPayload::Error {
                message: GENERIC_CHAT_ERROR,
            },
        };
        drop(guard);
        let _ = tx.unbounded_send(last);
    });

    let stream = rx.map(|payload| Ok(payload.into_event()));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
