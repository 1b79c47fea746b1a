use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::phase::Phase;

/// A finished phase, handed to the session sink for analytics.
///
/// Focus records are the "sessions" counted toward the daily total; break
/// records are kept so stats can report break time too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSession {
    pub id: Uuid,
    pub user_id: String,
    pub phase: Phase,
    pub duration_min: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
}
