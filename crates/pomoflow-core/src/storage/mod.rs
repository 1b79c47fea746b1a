//! Persistence for settings and completed sessions.
//!
//! The timer only sees the [`SettingsStore`] and [`SessionSink`] traits.
//! Implementations block; the session runner calls them off the async
//! threads.

mod config;
pub mod database;
mod memory;
pub mod migrations;

pub use config::Config;
pub use database::Database;
pub use memory::MemoryStore;

use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::settings::{PomodoroSettings, SettingsPatch};
use crate::timer::{CompletedSession, SessionNote};

/// Per-user timer settings storage.
pub trait SettingsStore: Send + Sync {
    /// Settings for `user_id`; defaults are created and persisted on first access.
    fn load(&self, user_id: &str) -> Result<PomodoroSettings>;

    /// Merge `patch` into the stored settings, stamp the update time and
    /// return the result. Last write wins.
    fn save(&self, user_id: &str, patch: &SettingsPatch) -> Result<PomodoroSettings>;
}

/// Receives finished phases and focus notes for analytics.
pub trait SessionSink: Send + Sync {
    fn record_session(&self, session: &CompletedSession) -> Result<()>;

    fn save_note(&self, note: &SessionNote) -> Result<()>;
}

/// Returns the data directory.
///
/// `POMOFLOW_DATA_DIR` wins when set; otherwise `~/.config/pomoflow[-dev]/`
/// based on POMOFLOW_ENV. Set POMOFLOW_ENV=dev to use the development
/// directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("POMOFLOW_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("POMOFLOW_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("pomoflow-dev")
            } else {
                base_dir.join("pomoflow")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
