//! One handler per user interaction; each returns a fresh view.

pub mod chat;
pub mod sessions;
pub mod summary;
pub mod upload;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use uuid::Uuid;

use crate::config::{ChatConfig, Config};
use crate::doc_processor::ocr::OcrEngine;
use crate::doc_processor::DocProcessor;
use crate::error::ApiError;
use crate::llm::Provider;
use crate::session::{SessionStore, SharedSession};

const INDEX_HTML: &str = include_str!("../../static/index.html");

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub processor: DocProcessor,
    /// `None` when no API key is configured; chat requests then fail with
    /// `ChatUnavailable` while the rest of the app keeps working.
    pub provider: Option<Provider>,
    pub chat: ChatConfig,
}

impl AppState {
    pub fn new(config: &Config, ocr: Arc<dyn OcrEngine>, provider: Option<Provider>) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(config.server.session_idle_timeout())),
            processor: DocProcessor::new(ocr),
            provider,
            chat: config.chat.clone(),
        }
    }

    pub async fn session(&self, id: &Uuid) -> Result<SharedSession, ApiError> {
        self.sessions.get(id).await.ok_or(ApiError::SessionNotFound)
    }
}

pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    let api = Router::new()
        .route("/sessions", post(sessions::create))
        .route("/sessions/:id/upload", post(upload::upload))
        .route("/sessions/:id/summary", get(summary::download))
        .route("/sessions/:id/chat", post(chat::send))
        .route("/sessions/:id/chat/open", post(chat::open))
        .route("/sessions/:id/chat/messages", get(chat::messages))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state);

    Router::new()
        .route("/", get(|| async { Html(INDEX_HTML) }))
        .route("/health", get(|| async { "ok" }))
        .nest("/api", api)
}
