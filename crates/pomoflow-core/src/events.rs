use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::PomodoroSettings;
use crate::timer::{CompletedSession, Phase, SessionNote, Snapshot};

/// Every state change in the timer produces an Event.
/// The presentation layer renders them; the session runner persists
/// completed sessions out of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        phase: Phase,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        phase: Phase,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        phase: Phase,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        phase: Phase,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    PhaseSkipped {
        from: Phase,
        to: Phase,
        at: DateTime<Utc>,
    },
    /// A phase counted down to zero. `note` is the flushed focus note, if any.
    PhaseCompleted {
        session: CompletedSession,
        note: Option<SessionNote>,
        next_phase: Phase,
        /// False means the engine is now waiting for the user.
        auto_started: bool,
        sessions_completed_today: u32,
        at: DateTime<Utc>,
    },
    SettingsChanged {
        settings: PomodoroSettings,
        at: DateTime<Utc>,
    },
    StateSnapshot(Snapshot),
}
