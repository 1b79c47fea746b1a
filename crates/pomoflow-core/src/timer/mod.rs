mod engine;
mod notes;
mod phase;
mod record;
mod service;
mod ticker;

pub use engine::{Snapshot, TimerEngine, TimerState};
pub use notes::{SessionNote, SessionNotesBuffer};
pub use phase::Phase;
pub use record::CompletedSession;
pub use service::{Command, ServiceDeps, TimerHandle, TimerService};
pub use ticker::spawn_ticker;

/// Who the engine runs for and where today's count starts.
///
/// Passed in explicitly; the engine never looks up a "current user".
/// Resetting the count at day rollover is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub sessions_completed_today: u32,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            sessions_completed_today: 0,
        }
    }

    pub fn with_sessions_today(mut self, count: u32) -> Self {
        self.sessions_completed_today = count;
        self
    }
}
