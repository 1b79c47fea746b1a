//! # Pomoflow Core Library
//!
//! Core logic for the Pomoflow focus timer. The CLI (and any other front end)
//! is a thin presentation layer over this crate.
//!
//! ## Architecture
//!
//! - **Timer Engine**: a tick-driven state machine cycling through focus,
//!   short-break and long-break phases. No internal threads; the caller
//!   delivers one `tick()` per elapsed second.
//! - **Session Runner**: drives an engine from a command channel, publishes
//!   snapshots and events, and hands completed sessions and notes to storage
//!   in the background.
//! - **Storage**: per-user settings and completed sessions in SQLite, plus an
//!   in-memory store; TOML-based application configuration.
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core timer state machine
//! - [`TimerService`]: Command-driven runner around the engine
//! - [`PomodoroSettings`]: Per-user timer configuration
//! - [`Database`]: Settings, session and note persistence

pub mod clock;
pub mod error;
pub mod events;
pub mod notify;
pub mod settings;
pub mod stats;
pub mod storage;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::Event;
pub use notify::{ChannelNotifier, Notice, NoticeLevel, Notifier, TracingNotifier};
pub use settings::{PomodoroSettings, SettingsPatch};
pub use stats::{start_of_day, DayBoundary, Stats};
pub use storage::{Config, Database, MemoryStore, SessionSink, SettingsStore};
pub use timer::{
    Command, CompletedSession, Phase, ServiceDeps, SessionContext, SessionNote, SessionNotesBuffer,
    Snapshot, TimerEngine, TimerHandle, TimerService, TimerState,
};
