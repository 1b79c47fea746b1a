use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free text captured during a focus phase, keyed by the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionNote {
    pub session_id: Uuid,
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Holds at most one note for the focus phase in progress.
///
/// `set` replaces the content; there is no history.
#[derive(Debug, Clone, Default)]
pub struct SessionNotesBuffer {
    text: String,
}

impl SessionNotesBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whitespace-only content counts as empty.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Take the buffered note for `session_id` and clear the buffer.
    ///
    /// An empty buffer yields no note.
    pub fn flush(
        &mut self,
        session_id: Uuid,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Option<SessionNote> {
        let text = std::mem::take(&mut self.text);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(SessionNote {
            session_id,
            user_id: user_id.to_string(),
            text: text.to_string(),
            created_at: at,
        })
    }
}
