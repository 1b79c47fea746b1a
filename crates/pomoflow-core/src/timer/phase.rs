use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::settings::PomodoroSettings;

/// One countdown segment of the pomodoro cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Focus,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub fn is_break(self) -> bool {
        !matches!(self, Phase::Focus)
    }

    /// Configured length in minutes.
    pub fn duration_min(self, settings: &PomodoroSettings) -> u32 {
        match self {
            Phase::Focus => settings.work_duration,
            Phase::ShortBreak => settings.short_break_duration,
            Phase::LongBreak => settings.long_break_duration,
        }
    }

    /// Configured length in seconds.
    ///
    /// Uses saturating arithmetic to prevent overflow with large values.
    pub fn duration_secs(self, settings: &PomodoroSettings) -> u64 {
        u64::from(self.duration_min(settings)).saturating_mul(60)
    }

    /// Whether entering this phase happens without user confirmation.
    pub fn auto_starts(self, settings: &PomodoroSettings) -> bool {
        if self.is_break() {
            settings.auto_start_breaks
        } else {
            settings.auto_start_pomodoros
        }
    }

    /// Break that follows a focus phase, given the updated session count.
    pub fn break_after(sessions_completed: u32, long_break_interval: u32) -> Phase {
        let interval = long_break_interval.max(1);
        if sessions_completed % interval == 0 {
            Phase::LongBreak
        } else {
            Phase::ShortBreak
        }
    }

    /// Phase entered when this one is skipped.
    pub fn skip_target(self) -> Phase {
        match self {
            Phase::Focus => Phase::ShortBreak,
            Phase::ShortBreak | Phase::LongBreak => Phase::Focus,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Focus => "focus",
            Phase::ShortBreak => "short_break",
            Phase::LongBreak => "long_break",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Focus => "Focus",
            Phase::ShortBreak => "Short Break",
            Phase::LongBreak => "Long Break",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "focus" => Ok(Phase::Focus),
            "short_break" => Ok(Phase::ShortBreak),
            "long_break" => Ok(Phase::LongBreak),
            other => Err(ValidationError::InvalidValue {
                field: "phase".into(),
                message: format!("unknown phase '{other}'"),
            }),
        }
    }
}
