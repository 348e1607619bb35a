//! Immutable view states returned to the browser after each interaction.

use serde::Serialize;

use crate::doc_processor::tabular::{Chart, TabularReport};
use crate::doc_processor::FileKind;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Outcome of one upload. `extracted_text` is what the session's report slot
/// is replaced with; `None` clears it.
#[derive(Debug, Clone, Serialize)]
pub struct UploadView {
    pub filename: String,
    pub kind: FileKind,
    pub extracted_text: Option<String>,
    pub table: Option<TabularReport>,
    pub charts: Vec<Chart>,
    pub notices: Vec<Notice>,
}

impl UploadView {
    pub fn new(filename: impl Into<String>, kind: FileKind) -> Self {
        Self {
            filename: filename.into(),
            kind,
            extracted_text: None,
            table: None,
            charts: Vec::new(),
            notices: vec![Notice::success("File Uploaded Successfully.")],
        }
    }

    pub fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn has_errors(&self) -> bool {
        self.notices.iter().any(|n| n.level == NoticeLevel::Error)
    }
}
