//! Per-user timer settings.
//!
//! Durations are whole minutes. A stored record that carries a non-positive
//! duration or interval is repaired field by field on load, so one corrupted
//! column never discards the rest of the user's preferences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const DEFAULT_WORK_MIN: u32 = 25;
pub const DEFAULT_SHORT_BREAK_MIN: u32 = 5;
pub const DEFAULT_LONG_BREAK_MIN: u32 = 15;
pub const DEFAULT_LONG_BREAK_INTERVAL: u32 = 4;
pub const DEFAULT_SOUND_THEME: &str = "bell";

/// Timer configuration for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomodoroSettings {
    #[serde(default = "default_work")]
    pub work_duration: u32,
    #[serde(default = "default_short_break")]
    pub short_break_duration: u32,
    #[serde(default = "default_long_break")]
    pub long_break_duration: u32,
    /// Focus sessions between long breaks.
    #[serde(default = "default_interval")]
    pub long_break_interval: u32,
    #[serde(default)]
    pub auto_start_breaks: bool,
    #[serde(default)]
    pub auto_start_pomodoros: bool,
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    #[serde(default = "default_sound_theme")]
    pub sound_theme: String,
    #[serde(default = "default_true")]
    pub notifications: bool,
    /// Stamped by the settings store on every save.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_work() -> u32 {
    DEFAULT_WORK_MIN
}
fn default_short_break() -> u32 {
    DEFAULT_SHORT_BREAK_MIN
}
fn default_long_break() -> u32 {
    DEFAULT_LONG_BREAK_MIN
}
fn default_interval() -> u32 {
    DEFAULT_LONG_BREAK_INTERVAL
}
fn default_true() -> bool {
    true
}
fn default_sound_theme() -> String {
    DEFAULT_SOUND_THEME.into()
}

impl Default for PomodoroSettings {
    fn default() -> Self {
        Self {
            work_duration: DEFAULT_WORK_MIN,
            short_break_duration: DEFAULT_SHORT_BREAK_MIN,
            long_break_duration: DEFAULT_LONG_BREAK_MIN,
            long_break_interval: DEFAULT_LONG_BREAK_INTERVAL,
            auto_start_breaks: false,
            auto_start_pomodoros: false,
            sound_enabled: true,
            sound_theme: default_sound_theme(),
            notifications: true,
            updated_at: None,
        }
    }
}

impl PomodoroSettings {
    /// Reject settings that would give a phase no length.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("work_duration", self.work_duration),
            ("short_break_duration", self.short_break_duration),
            ("long_break_duration", self.long_break_duration),
            ("long_break_interval", self.long_break_interval),
        ] {
            if value == 0 {
                return Err(ValidationError::InvalidValue {
                    field: field.into(),
                    message: "must be at least 1".into(),
                });
            }
        }
        Ok(())
    }

    /// Apply `patch` to a copy of these settings and validate the result.
    pub fn merged(&self, patch: &SettingsPatch) -> Result<Self, ValidationError> {
        let mut next = self.clone();
        patch.apply(&mut next);
        next.validate()?;
        Ok(next)
    }

    /// Replace every zero duration or interval with its default.
    ///
    /// Returns the names of the fields that were repaired.
    pub fn sanitize(&mut self) -> Vec<&'static str> {
        let mut repaired = Vec::new();
        let defaults = Self::default();
        let fields: [(&'static str, &mut u32, u32); 4] = [
            ("work_duration", &mut self.work_duration, defaults.work_duration),
            (
                "short_break_duration",
                &mut self.short_break_duration,
                defaults.short_break_duration,
            ),
            (
                "long_break_duration",
                &mut self.long_break_duration,
                defaults.long_break_duration,
            ),
            (
                "long_break_interval",
                &mut self.long_break_interval,
                defaults.long_break_interval,
            ),
        ];
        for (name, value, default) in fields {
            if *value == 0 {
                *value = default;
                repaired.push(name);
            }
        }
        repaired
    }
}

/// Settings exactly as a storage row holds them, before any repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSettings {
    pub work_duration: i64,
    pub short_break_duration: i64,
    pub long_break_duration: i64,
    pub long_break_interval: i64,
    pub auto_start_breaks: bool,
    pub auto_start_pomodoros: bool,
    pub sound_enabled: bool,
    pub sound_theme: Option<String>,
    pub notifications: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredSettings {
    /// Convert to validated settings, substituting defaults per field.
    pub fn into_settings(self) -> PomodoroSettings {
        let mut settings = PomodoroSettings {
            work_duration: to_minutes(self.work_duration),
            short_break_duration: to_minutes(self.short_break_duration),
            long_break_duration: to_minutes(self.long_break_duration),
            long_break_interval: to_minutes(self.long_break_interval),
            auto_start_breaks: self.auto_start_breaks,
            auto_start_pomodoros: self.auto_start_pomodoros,
            sound_enabled: self.sound_enabled,
            sound_theme: self
                .sound_theme
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(default_sound_theme),
            notifications: self.notifications,
            updated_at: self.updated_at,
        };
        let repaired = settings.sanitize();
        if !repaired.is_empty() {
            tracing::warn!(fields = ?repaired, "stored settings had invalid values; using defaults");
        }
        settings
    }
}

impl From<&PomodoroSettings> for StoredSettings {
    fn from(s: &PomodoroSettings) -> Self {
        Self {
            work_duration: s.work_duration.into(),
            short_break_duration: s.short_break_duration.into(),
            long_break_duration: s.long_break_duration.into(),
            long_break_interval: s.long_break_interval.into(),
            auto_start_breaks: s.auto_start_breaks,
            auto_start_pomodoros: s.auto_start_pomodoros,
            sound_enabled: s.sound_enabled,
            sound_theme: Some(s.sound_theme.clone()),
            notifications: s.notifications,
            updated_at: s.updated_at,
        }
    }
}

// Out-of-range values become 0 so that `sanitize` picks them up.
fn to_minutes(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

/// A partial settings update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_break_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_break_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_break_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_start_breaks: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_start_pomodoros: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, settings: &mut PomodoroSettings) {
        if let Some(v) = self.work_duration {
            settings.work_duration = v;
        }
        if let Some(v) = self.short_break_duration {
            settings.short_break_duration = v;
        }
        if let Some(v) = self.long_break_duration {
            settings.long_break_duration = v;
        }
        if let Some(v) = self.long_break_interval {
            settings.long_break_interval = v;
        }
        if let Some(v) = self.auto_start_breaks {
            settings.auto_start_breaks = v;
        }
        if let Some(v) = self.auto_start_pomodoros {
            settings.auto_start_pomodoros = v;
        }
        if let Some(v) = self.sound_enabled {
            settings.sound_enabled = v;
        }
        if let Some(ref v) = self.sound_theme {
            settings.sound_theme = v.clone();
        }
        if let Some(v) = self.notifications {
            settings.notifications = v;
        }
    }

    /// Build a single-field patch from a textual key and value.
    pub fn from_key_value(key: &str, value: &str) -> Result<Self, ValidationError> {
        let mut patch = Self::default();
        match key {
            "work_duration" => patch.work_duration = Some(parse_minutes(key, value)?),
            "short_break_duration" => {
                patch.short_break_duration = Some(parse_minutes(key, value)?)
            }
            "long_break_duration" => patch.long_break_duration = Some(parse_minutes(key, value)?),
            "long_break_interval" => patch.long_break_interval = Some(parse_minutes(key, value)?),
            "auto_start_breaks" => patch.auto_start_breaks = Some(parse_bool(key, value)?),
            "auto_start_pomodoros" => patch.auto_start_pomodoros = Some(parse_bool(key, value)?),
            "sound_enabled" => patch.sound_enabled = Some(parse_bool(key, value)?),
            "sound_theme" => patch.sound_theme = Some(value.to_string()),
            "notifications" => patch.notifications = Some(parse_bool(key, value)?),
            other => return Err(ValidationError::UnknownField(other.to_string())),
        }
        Ok(patch)
    }
}

fn parse_minutes(field: &str, value: &str) -> Result<u32, ValidationError> {
    match value.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ValidationError::InvalidValue {
            field: field.into(),
            message: format!("expected a positive whole number, got '{value}'"),
        }),
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ValidationError> {
    value
        .trim()
        .parse::<bool>()
        .map_err(|_| ValidationError::InvalidValue {
            field: field.into(),
            message: format!("expected true or false, got '{value}'"),
        })
}
