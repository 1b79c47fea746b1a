//! In-process storage.
//!
//! Backs a timer that runs without any durable backend, and lets tests
//! switch individual operations into failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{SessionSink, SettingsStore};
use crate::clock::{Clock, SystemClock};
use crate::error::{DatabaseError, Result};
use crate::settings::{PomodoroSettings, SettingsPatch};
use crate::timer::{CompletedSession, SessionNote};

#[derive(Debug)]
pub struct MemoryStore {
    settings: Mutex<HashMap<String, PomodoroSettings>>,
    sessions: Mutex<Vec<CompletedSession>>,
    notes: Mutex<Vec<SessionNote>>,
    fail_loads: AtomicBool,
    fail_writes: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            settings: Mutex::default(),
            sessions: Mutex::default(),
            notes: Mutex::default(),
            fail_loads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            clock: Arc::new(SystemClock),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `updated_at` from `clock` instead of the system time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Make every `load` fail until switched back.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Make every write (settings save, session, note) fail until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store settings as-is, bypassing validation.
    pub fn put_settings(&self, user_id: &str, settings: PomodoroSettings) {
        lock(&self.settings).insert(user_id.to_string(), settings);
    }

    pub fn settings_for(&self, user_id: &str) -> Option<PomodoroSettings> {
        lock(&self.settings).get(user_id).cloned()
    }

    pub fn sessions(&self) -> Vec<CompletedSession> {
        lock(&self.sessions).clone()
    }

    pub fn notes(&self) -> Vec<SessionNote> {
        lock(&self.notes).clone()
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Unavailable("writes disabled".into()).into());
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl SettingsStore for MemoryStore {
    fn load(&self, user_id: &str) -> Result<PomodoroSettings> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(DatabaseError::Unavailable("loads disabled".into()).into());
        }
        let mut all = lock(&self.settings);
        let settings = all
            .entry(user_id.to_string())
            .or_insert_with(|| PomodoroSettings {
                updated_at: Some(self.clock.now()),
                ..Default::default()
            });
        Ok(settings.clone())
    }

    fn save(&self, user_id: &str, patch: &SettingsPatch) -> Result<PomodoroSettings> {
        self.check_write()?;
        let mut all = lock(&self.settings);
        let mut current = all.get(user_id).cloned().unwrap_or_default();
        let repaired = current.sanitize();
        if !repaired.is_empty() {
            tracing::warn!(
                user = user_id,
                fields = ?repaired,
                "repaired stored settings before save"
            );
        }
        let mut next = current.merged(patch)?;
        next.updated_at = Some(self.clock.now());
        all.insert(user_id.to_string(), next.clone());
        Ok(next)
    }
}

impl SessionSink for MemoryStore {
    fn record_session(&self, session: &CompletedSession) -> Result<()> {
        self.check_write()?;
        lock(&self.sessions).push(session.clone());
        Ok(())
    }

    fn save_note(&self, note: &SessionNote) -> Result<()> {
        self.check_write()?;
        lock(&self.notes).push(note.clone());
        Ok(())
    }
}
