//! Conversation logging
//!
//! Every completed exchange is appended to a JSONL file, one session per
//! line, so transcripts survive process restarts and can be replayed or
//! audited later. Logging failures are reported but never fail a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedMessage {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl LoggedMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub patient_name: String,
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub messages: Vec<LoggedMessage>,
}

pub struct ConversationLogger {
    path: PathBuf,
    // Serializes appends so concurrent requests never interleave lines
    write_lock: Mutex<()>,
}

impl ConversationLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Append one session as a single JSONL line. Errors are logged and
    /// swallowed; a failed transcript write must not fail the exchange.
    pub fn record(&self, session: &ConversationSession) {
        if let Err(e) = self.append(session) {
            warn!(error = %e, path = %self.path.display(), "Failed to append conversation log");
        }
    }

    fn append(&self, session: &ConversationSession) -> std::io::Result<()> {
        let line = serde_json::to_string(session)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

/// Convenience for the single request/response exchange the intake
/// endpoint produces.
pub fn exchange_session(
    patient_name: &str,
    user_text: &str,
    assistant_text: &str,
    session_start: DateTime<Utc>,
) -> ConversationSession {
    ConversationSession {
        patient_name: patient_name.to_string(),
        session_start,
        session_end: Utc::now(),
        messages: vec![
            LoggedMessage::user(user_text),
            LoggedMessage::assistant(assistant_text),
        ],
    }
}
