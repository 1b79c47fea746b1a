//! SQLite-based storage.
//!
//! Provides persistent storage for:
//! - Per-user timer settings
//! - Completed phases (the analytics feed)
//! - Notes written during focus sessions

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{data_dir, migrations, SessionSink, SettingsStore};
use crate::clock::{Clock, SystemClock};
use crate::error::{DatabaseError, Result};
use crate::settings::{PomodoroSettings, SettingsPatch, StoredSettings};
use crate::stats::{start_of_day, DayBoundary, Stats};
use crate::timer::{CompletedSession, Phase, SessionNote};

/// SQLite database for settings and session storage.
///
/// The connection sits behind a mutex so one database can be shared by the
/// session runner's background jobs.
pub struct Database {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl Database {
    /// Open the database at `<data dir>/pomoflow.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(data_dir()?.join("pomoflow.db"))
    }

    /// Open (or create) the database file at `path`.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        })
    }

    /// Stamp `updated_at` from `clock` instead of the system time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Settings ─────────────────────────────────────────────────────

    fn read_settings(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<StoredSettings>> {
        conn.query_row(
            "SELECT work_duration, short_break_duration, long_break_duration, long_break_interval,
                    auto_start_breaks, auto_start_pomodoros, sound_enabled, sound_theme,
                    notifications, updated_at
             FROM settings WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(StoredSettings {
                    work_duration: row.get(0)?,
                    short_break_duration: row.get(1)?,
                    long_break_duration: row.get(2)?,
                    long_break_interval: row.get(3)?,
                    auto_start_breaks: row.get(4)?,
                    auto_start_pomodoros: row.get(5)?,
                    sound_enabled: row.get(6)?,
                    sound_theme: row.get(7)?,
                    notifications: row.get(8)?,
                    updated_at: optional_time(row, 9)?,
                })
            },
        )
        .optional()
    }

    fn write_settings(
        conn: &Connection,
        user_id: &str,
        settings: &PomodoroSettings,
    ) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO settings (
                user_id, work_duration, short_break_duration, long_break_duration,
                long_break_interval, auto_start_breaks, auto_start_pomodoros,
                sound_enabled, sound_theme, notifications, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                user_id,
                settings.work_duration,
                settings.short_break_duration,
                settings.long_break_duration,
                settings.long_break_interval,
                settings.auto_start_breaks,
                settings.auto_start_pomodoros,
                settings.sound_enabled,
                settings.sound_theme,
                settings.notifications,
                settings.updated_at.map(format_time),
            ],
        )?;
        Ok(())
    }

    /// Overwrite a user's settings with the defaults.
    pub fn reset_settings(&self, user_id: &str) -> Result<PomodoroSettings> {
        let settings = PomodoroSettings {
            updated_at: Some(self.clock.now()),
            ..Default::default()
        };
        Self::write_settings(&self.conn(), user_id, &settings)?;
        Ok(settings)
    }

    // ── Sessions ─────────────────────────────────────────────────────

    /// Number of focus sessions completed at or after `since`.
    pub fn focus_sessions_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<u32> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM sessions
             WHERE user_id = ?1 AND phase = 'focus' AND completed_at >= ?2",
            params![user_id, format_time(since)],
            |row| row.get(0),
        )?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Aggregates for sessions completed at or after `since` (all time when `None`).
    pub fn stats_since(&self, user_id: &str, since: Option<DateTime<Utc>>) -> Result<Stats> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT phase, COUNT(*), COALESCE(SUM(duration_min), 0)
             FROM sessions
             WHERE user_id = ?1 AND completed_at >= ?2
             GROUP BY phase",
        )?;

        // The empty string sorts before every stored timestamp.
        let since = since.map(format_time).unwrap_or_default();
        let rows = stmt.query_map(params![user_id, since], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut stats = Stats::default();
        for row in rows {
            let (phase, count, minutes) = row?;
            let count = u64::try_from(count).unwrap_or(0);
            let minutes = u64::try_from(minutes).unwrap_or(0);
            stats.total_records += count;
            match phase.parse::<Phase>() {
                Ok(Phase::Focus) => {
                    stats.focus_sessions += count;
                    stats.focus_min += minutes;
                }
                Ok(Phase::ShortBreak | Phase::LongBreak) => stats.break_min += minutes,
                Err(_) => tracing::warn!(%phase, "ignoring sessions with unknown phase"),
            }
        }
        Ok(stats)
    }

    pub fn stats_today(
        &self,
        user_id: &str,
        boundary: DayBoundary,
        now: DateTime<Utc>,
    ) -> Result<Stats> {
        self.stats_since(user_id, Some(start_of_day(now, boundary)))
    }

    pub fn stats_all(&self, user_id: &str) -> Result<Stats> {
        self.stats_since(user_id, None)
    }

    /// Most recent completed records first.
    pub fn recent_sessions(&self, user_id: &str, limit: usize) -> Result<Vec<CompletedSession>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, phase, duration_min, started_at, completed_at, note
             FROM sessions
             WHERE user_id = ?1
             ORDER BY completed_at DESC
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![user_id, limit], |row| {
            Ok(CompletedSession {
                id: uuid_column(row, 0)?,
                user_id: row.get(1)?,
                phase: phase_column(row, 2)?,
                duration_min: row.get(3)?,
                started_at: time_column(row, 4)?,
                completed_at: time_column(row, 5)?,
                note: row.get(6)?,
            })
        })?;
        let sessions = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    pub fn session_note(&self, session_id: Uuid) -> Result<Option<SessionNote>> {
        let note = self
            .conn()
            .query_row(
                "SELECT session_id, user_id, text, created_at
                 FROM session_notes WHERE session_id = ?1",
                params![session_id.to_string()],
                |row| {
                    Ok(SessionNote {
                        session_id: uuid_column(row, 0)?,
                        user_id: row.get(1)?,
                        text: row.get(2)?,
                        created_at: time_column(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(note)
    }
}

impl SettingsStore for Database {
    fn load(&self, user_id: &str) -> Result<PomodoroSettings> {
        let conn = self.conn();
        match Self::read_settings(&conn, user_id)? {
            Some(stored) => Ok(stored.into_settings()),
            None => {
                let settings = PomodoroSettings {
                    updated_at: Some(self.clock.now()),
                    ..Default::default()
                };
                Self::write_settings(&conn, user_id, &settings)?;
                tracing::debug!(user = user_id, "created default settings");
                Ok(settings)
            }
        }
    }

    fn save(&self, user_id: &str, patch: &SettingsPatch) -> Result<PomodoroSettings> {
        let conn = self.conn();
        let current = Self::read_settings(&conn, user_id)?
            .map(StoredSettings::into_settings)
            .unwrap_or_default();
        let mut next = current.merged(patch)?;
        next.updated_at = Some(self.clock.now());
        Self::write_settings(&conn, user_id, &next)?;
        Ok(next)
    }
}

impl SessionSink for Database {
    fn record_session(&self, session: &CompletedSession) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sessions (id, user_id, phase, duration_min, started_at, completed_at, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id.to_string(),
                session.user_id,
                session.phase.as_str(),
                session.duration_min,
                format_time(session.started_at),
                format_time(session.completed_at),
                session.note,
            ],
        )?;
        Ok(())
    }

    fn save_note(&self, note: &SessionNote) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO session_notes (session_id, user_id, text, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                note.session_id.to_string(),
                note.user_id,
                note.text,
                format_time(note.created_at),
            ],
        )?;
        Ok(())
    }
}

// Fixed-width UTC timestamps so text comparison orders them correctly.
fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_time(idx, &raw)
}

fn optional_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_time(idx, &r)).transpose()
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn phase_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Phase> {
    let raw: String = row.get(idx)?;
    raw.parse::<Phase>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
