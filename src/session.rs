//! Per-browser session state: the report slot and the chat history.
//!
//! Nothing here outlives the process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::llm::{ChatMessage, LlmError, Role};
use crate::view::UploadView;

/// Characters of extracted text forwarded to the assistant.
pub const REPORT_CONTEXT_CHARS: usize = 1500;

pub const NO_CONTENT_PLACEHOLDER: &str = "No content extracted.";

pub const APOLOGY_MESSAGE: &str = "Sorry, something went wrong. Please try again later.";

pub const SYSTEM_PROMPT: &str = "You are a doctor with 10 years of experience in solving patients' diseases and curing them.
Your role is to provide accurate, up-to-date, and helpful information on healthcare topics, and only healthcare topics.
If a query is unrelated to health, reply with: \"Sorry, I'm an AI health assistant and can help you with any query related to healthcare.\"
Do not provide programming help or hallucinate answers.";

/// Lifecycle of the most recent upload's text with respect to the chat.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ReportContext {
    #[default]
    Empty,
    /// Extracted but not yet shown to the assistant.
    Pending(String),
    /// Already injected into the chat history.
    Consumed(String),
}

impl ReportContext {
    pub fn text(&self) -> Option<&str> {
        match self {
            ReportContext::Empty => None,
            ReportContext::Pending(text) | ReportContext::Consumed(text) => Some(text),
        }
    }

    /// `Pending -> Consumed`, handing back the text. Any other state is left
    /// untouched and yields `None`.
    fn consume(&mut self) -> Option<String> {
        match std::mem::take(self) {
            ReportContext::Pending(text) => {
                *self = ReportContext::Consumed(text.clone());
                Some(text)
            }
            other => {
                *self = other;
                None
            }
        }
    }
}

fn report_context_message(text: &str) -> ChatMessage {
    let excerpt: String = text.chars().take(REPORT_CONTEXT_CHARS).collect();
    ChatMessage::user(format!(
        "The user has uploaded a medical report with the following extracted content:\n\n{excerpt}..."
    ))
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self {
            messages: vec![ChatMessage::system(SYSTEM_PROMPT)],
        }
    }
}

impl ChatHistory {
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// What the chat panel shows; the system prompt is hidden.
    pub fn visible(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect()
    }
}

/// Result of one assistant turn as recorded in history.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Answered(String),
    Failed,
}

#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    report: ReportContext,
    history: ChatHistory,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            report: ReportContext::Empty,
            history: ChatHistory::default(),
        }
    }

    pub fn report(&self) -> &ReportContext {
        &self.report
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// A new upload always replaces the report slot, even when extraction
    /// produced nothing.
    pub fn record_upload(&mut self, view: &UploadView) {
        self.report = match &view.extracted_text {
            Some(text) => ReportContext::Pending(text.clone()),
            None => ReportContext::Empty,
        };
    }

    /// Body of the summary download.
    pub fn summary_text(&self) -> &str {
        self.report.text().unwrap_or(NO_CONTENT_PLACEHOLDER)
    }

    /// Append the pending report excerpt to history, once. Returns whether
    /// anything was injected.
    pub fn inject_pending_report(&mut self) -> bool {
        match self.report.consume() {
            Some(text) => {
                self.history.push(report_context_message(&text));
                true
            }
            None => false,
        }
    }

    /// Record the user's prompt and return the full history to send upstream.
    pub fn begin_turn(&mut self, prompt: &str) -> Vec<ChatMessage> {
        self.inject_pending_report();
        self.history.push(ChatMessage::user(prompt));
        self.history.messages().to_vec()
    }

    /// Record the assistant's reply, or the fixed apology if the completion
    /// failed.
    pub fn finish_turn(&mut self, result: Result<String, LlmError>) -> TurnOutcome {
        match result {
            Ok(content) => {
                self.history.push(ChatMessage::assistant(content.clone()));
                TurnOutcome::Answered(content)
            }
            Err(_) => {
                self.history.push(ChatMessage::assistant(APOLOGY_MESSAGE));
                TurnOutcome::Failed
            }
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

struct StoredSession {
    session: SharedSession,
    last_seen: Instant,
}

/// Registry of live sessions. Each session sits behind its own async mutex
/// so one interaction runs at a time per session. Sessions untouched for
/// longer than `idle_timeout` are dropped on the next create or lookup.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, StoredSession>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub async fn create(&self) -> Uuid {
        let session = Session::new();
        let id = session.id;
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        self.evict_idle(&mut sessions, now);
        sessions.insert(
            id,
            StoredSession {
                session: Arc::new(Mutex::new(session)),
                last_seen: now,
            },
        );
        tracing::info!(session = %id, live = sessions.len(), "Session created");
        id
    }

    /// Look up a session and mark it as active.
    pub async fn get(&self, id: &Uuid) -> Option<SharedSession> {
        self.get_at(id, Instant::now()).await
    }

    async fn get_at(&self, id: &Uuid, now: Instant) -> Option<SharedSession> {
        let mut sessions = self.sessions.write().await;
        self.evict_idle(&mut sessions, now);
        let stored = sessions.get_mut(id)?;
        stored.last_seen = now;
        Some(Arc::clone(&stored.session))
    }

    fn evict_idle(&self, sessions: &mut HashMap<Uuid, StoredSession>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, s| now.saturating_duration_since(s.last_seen) <= self.idle_timeout);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, live = sessions.len(), "Idle sessions evicted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc_processor::FileKind;

    fn upload(text: Option<&str>) -> UploadView {
        let mut view = UploadView::new("report.txt", FileKind::Text);
        view.extracted_text = text.map(str::to_string);
        view
    }

    fn count_report_messages(session: &Session) -> usize {
        session
            .history()
            .messages()
            .iter()
            .filter(|m| m.content.starts_with("The user has uploaded a medical report"))
            .count()
    }

    #[test]
    fn test_history_starts_with_hidden_system_prompt() {
        let session = Session::new();
        assert_eq!(session.history().messages().len(), 1);
        assert_eq!(session.history().messages()[0].role, Role::System);
        assert!(session.history().visible().is_empty());
    }

    #[test]
    fn test_summary_placeholder_then_exact_text() {
        let mut session = Session::new();
        assert_eq!(session.summary_text(), "No content extracted.");

        session.record_upload(&upload(Some("LDL 130 mg/dL\n")));
        assert_eq!(session.summary_text(), "LDL 130 mg/dL\n");
    }

    #[test]
    fn test_new_upload_replaces_previous_text() {
        let mut session = Session::new();
        session.record_upload(&upload(Some("first")));
        session.record_upload(&upload(Some("second")));
        assert_eq!(session.report(), &ReportContext::Pending("second".into()));

        session.record_upload(&upload(None));
        assert_eq!(session.report(), &ReportContext::Empty);
        assert_eq!(session.summary_text(), NO_CONTENT_PLACEHOLDER);
    }

    #[test]
    fn test_report_injected_once() {
        let mut session = Session::new();
        session.record_upload(&upload(Some("glucose 101")));

        let first = session.begin_turn("Is my glucose normal?");
        session.finish_turn(Ok("Slightly elevated.".into()));
        let second = session.begin_turn("What should I eat?");

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 5);
        assert_eq!(count_report_messages(&session), 1);
        assert!(matches!(session.report(), ReportContext::Consumed(_)));
        // Still downloadable after the chat consumed it.
        assert_eq!(session.summary_text(), "glucose 101");
    }

    #[test]
    fn test_reupload_injects_again() {
        let mut session = Session::new();
        session.record_upload(&upload(Some("a")));
        assert!(session.inject_pending_report());
        assert!(!session.inject_pending_report());
        session.record_upload(&upload(Some("b")));
        assert!(session.inject_pending_report());
        assert_eq!(count_report_messages(&session), 2);
    }

    #[test]
    fn test_report_excerpt_truncated_to_1500_chars() {
        let mut session = Session::new();
        let long = "é".repeat(2000);
        session.record_upload(&upload(Some(&long)));
        session.inject_pending_report();

        let msg = session.history().messages().last().unwrap();
        assert_eq!(msg.role, Role::User);
        let body = msg
            .content
            .strip_prefix("The user has uploaded a medical report with the following extracted content:\n\n")
            .unwrap();
        assert_eq!(body.chars().count(), REPORT_CONTEXT_CHARS + 3);
        assert!(body.ends_with("é..."));
    }

    #[test]
    fn test_empty_slot_injects_nothing() {
        let mut session = Session::new();
        let messages = session.begin_turn("hello");
        assert_eq!(messages.len(), 2);
        assert_eq!(count_report_messages(&session), 0);
    }

    #[test]
    fn test_failed_turn_records_apology() {
        let mut session = Session::new();
        session.begin_turn("Hi");
        let outcome = session.finish_turn(Err(LlmError::Api {
            status: 500,
            message: "upstream exploded".into(),
        }));
        assert_eq!(outcome, TurnOutcome::Failed);
        let last = session.history().messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, APOLOGY_MESSAGE);
    }

    #[tokio::test]
    async fn test_store_create_and_lookup() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create().await;
        let session = store.get(&id).await.unwrap();
        assert_eq!(session.lock().await.id, id);
        assert!(store.get(&Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create().await;
        let start = Instant::now();

        // A lookup inside the window refreshes the session.
        assert!(store.get_at(&id, start + Duration::from_secs(50)).await.is_some());
        assert!(store.get_at(&id, start + Duration::from_secs(100)).await.is_some());

        assert!(store.get_at(&id, start + Duration::from_secs(200)).await.is_none());
        assert!(store.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_evicts_other_idle_sessions() {
        let store = SessionStore::new(Duration::ZERO);
        let stale = store.create().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let fresh = store.create().await;

        let sessions = store.sessions.read().await;
        assert!(!sessions.contains_key(&stale));
        assert!(sessions.contains_key(&fresh));
    }
}
