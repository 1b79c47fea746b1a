//! Timer engine implementation.
//!
//! The timer engine is a tick-driven state machine. It does not use internal
//! threads or read the system time: the caller delivers one `tick()` per
//! elapsed second and timestamps come from the injected [`Clock`].
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused
//! Running --(phase done, no auto-start)--> WaitingForUser --start--> Running
//! Running --(phase done, auto-start)-----> Running (next phase)
//! any --reset--> Idle
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(ctx, settings, clock);
//! engine.start();
//! // Once per second:
//! engine.tick(); // Returns Some(Event::PhaseCompleted) when a phase finishes
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notes::SessionNotesBuffer;
use super::phase::Phase;
use super::record::CompletedSession;
use super::SessionContext;
use crate::clock::Clock;
use crate::events::Event;
use crate::settings::PomodoroSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    /// A phase finished but auto-start is off for the next one.
    WaitingForUser,
}

/// Point-in-time view of the engine for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: TimerState,
    pub phase: Phase,
    /// Phase that `start` will enter while waiting for the user.
    pub pending_phase: Option<Phase>,
    pub remaining_secs: u64,
    pub total_secs: u64,
    /// 0.0 .. 1.0 progress within the current phase.
    pub progress: f64,
    pub sessions_completed_today: u32,
    pub note: String,
    pub is_active: bool,
    pub is_waiting_for_user: bool,
}

/// Core timer engine.
#[derive(Debug, Clone)]
pub struct TimerEngine {
    user_id: String,
    settings: PomodoroSettings,
    clock: Arc<dyn Clock>,
    state: TimerState,
    phase: Phase,
    pending: Option<Phase>,
    /// Remaining time in seconds for the current phase.
    remaining_secs: u64,
    /// Length the current phase started with. Settings edits do not change it.
    total_secs: u64,
    sessions_completed_today: u32,
    notes: SessionNotesBuffer,
    phase_started_at: Option<DateTime<Utc>>,
}

impl TimerEngine {
    /// Create an engine in `Idle` with a full focus phase ready.
    pub fn new(ctx: SessionContext, settings: PomodoroSettings, clock: Arc<dyn Clock>) -> Self {
        let total_secs = Phase::Focus.duration_secs(&settings);
        Self {
            user_id: ctx.user_id,
            settings,
            clock,
            state: TimerState::Idle,
            phase: Phase::Focus,
            pending: None,
            remaining_secs: total_secs,
            total_secs,
            sessions_completed_today: ctx.sessions_completed_today,
            notes: SessionNotesBuffer::new(),
            phase_started_at: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pending_phase(&self) -> Option<Phase> {
        self.pending
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn total_secs(&self) -> u64 {
        self.total_secs
    }

    pub fn sessions_completed_today(&self) -> u32 {
        self.sessions_completed_today
    }

    pub fn settings(&self) -> &PomodoroSettings {
        &self.settings
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn note(&self) -> &str {
        self.notes.text()
    }

    pub fn is_active(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn is_waiting_for_user(&self) -> bool {
        self.state == TimerState::WaitingForUser
    }

    /// 0.0 .. 1.0 progress within the current phase.
    pub fn progress(&self) -> f64 {
        if self.total_secs == 0 {
            return 0.0;
        }
        1.0 - (self.remaining_secs as f64 / self.total_secs as f64)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            phase: self.phase,
            pending_phase: self.pending,
            remaining_secs: self.remaining_secs,
            total_secs: self.total_secs,
            progress: self.progress(),
            sessions_completed_today: self.sessions_completed_today,
            note: self.notes.text().to_string(),
            is_active: self.is_active(),
            is_waiting_for_user: self.is_waiting_for_user(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> Option<Event> {
        let now = self.clock.now();
        match self.state {
            TimerState::Running => None,
            TimerState::Idle => {
                self.state = TimerState::Running;
                self.phase_started_at.get_or_insert(now);
                tracing::debug!(phase = %self.phase, remaining = self.remaining_secs, "timer started");
                Some(Event::TimerStarted {
                    phase: self.phase,
                    remaining_secs: self.remaining_secs,
                    at: now,
                })
            }
            TimerState::Paused => {
                self.state = TimerState::Running;
                tracing::debug!(phase = %self.phase, remaining = self.remaining_secs, "timer resumed");
                Some(Event::TimerResumed {
                    phase: self.phase,
                    remaining_secs: self.remaining_secs,
                    at: now,
                })
            }
            TimerState::WaitingForUser => {
                let next = self.pending.take().unwrap_or(self.phase);
                self.enter_phase(next);
                self.state = TimerState::Running;
                self.phase_started_at = Some(now);
                tracing::debug!(phase = %self.phase, "pending phase started by user");
                Some(Event::TimerStarted {
                    phase: self.phase,
                    remaining_secs: self.remaining_secs,
                    at: now,
                })
            }
        }
    }

    pub fn pause(&mut self) -> Option<Event> {
        if self.state != TimerState::Running {
            return None;
        }
        self.state = TimerState::Paused;
        tracing::debug!(phase = %self.phase, remaining = self.remaining_secs, "timer paused");
        Some(Event::TimerPaused {
            phase: self.phase,
            remaining_secs: self.remaining_secs,
            at: self.clock.now(),
        })
    }

    /// Back to `Idle` with the full duration of the current phase.
    ///
    /// While waiting for the user the pending phase becomes the current one.
    pub fn reset(&mut self) -> Option<Event> {
        if let Some(next) = self.pending.take() {
            self.phase = next;
        }
        self.enter_phase(self.phase);
        self.state = TimerState::Idle;
        self.phase_started_at = None;
        Some(Event::TimerReset {
            phase: self.phase,
            remaining_secs: self.remaining_secs,
            at: self.clock.now(),
        })
    }

    /// Abandon the phase that would run next without recording it.
    pub fn skip(&mut self) -> Option<Event> {
        let from = self.pending.take().unwrap_or(self.phase);
        let to = from.skip_target();
        self.enter_phase(to);
        self.state = TimerState::Idle;
        self.phase_started_at = None;
        tracing::debug!(%from, %to, "phase skipped");
        Some(Event::PhaseSkipped {
            from,
            to,
            at: self.clock.now(),
        })
    }

    /// Call once per elapsed second. Returns `Some(Event::PhaseCompleted)`
    /// when the countdown reaches zero.
    pub fn tick(&mut self) -> Option<Event> {
        if self.state != TimerState::Running {
            return None;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            return Some(self.complete_phase());
        }
        None
    }

    pub fn set_note(&mut self, text: impl Into<String>) {
        self.notes.set(text);
    }

    /// Replace the settings. A phase that has been started keeps its length;
    /// new durations apply from the next time each phase is entered. An idle
    /// phase that never ran is reloaded with the new length.
    pub fn set_settings(&mut self, settings: PomodoroSettings) {
        self.settings = settings;
        if self.state == TimerState::Idle
            && self.pending.is_none()
            && self.phase_started_at.is_none()
        {
            self.enter_phase(self.phase);
        }
    }

    pub fn set_sessions_completed_today(&mut self, count: u32) {
        self.sessions_completed_today = count;
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn enter_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.total_secs = phase.duration_secs(&self.settings);
        self.remaining_secs = self.total_secs;
    }

    fn complete_phase(&mut self) -> Event {
        let now = self.clock.now();
        let completed = self.phase;
        let session_id = Uuid::new_v4();

        let note = if completed == Phase::Focus {
            self.sessions_completed_today = self.sessions_completed_today.saturating_add(1);
            self.notes.flush(session_id, &self.user_id, now)
        } else {
            None
        };

        let next = match completed {
            Phase::Focus => {
                Phase::break_after(self.sessions_completed_today, self.settings.long_break_interval)
            }
            Phase::ShortBreak | Phase::LongBreak => Phase::Focus,
        };

        let total_secs = i64::try_from(self.total_secs).unwrap_or(0);
        let started_at = self
            .phase_started_at
            .unwrap_or_else(|| now - Duration::seconds(total_secs));
        let session = CompletedSession {
            id: session_id,
            user_id: self.user_id.clone(),
            phase: completed,
            duration_min: u32::try_from(self.total_secs / 60).unwrap_or(u32::MAX),
            started_at,
            completed_at: now,
            note: note.as_ref().map(|n| n.text.clone()),
        };

        let auto_started = next.auto_starts(&self.settings);
        if auto_started {
            self.enter_phase(next);
            self.state = TimerState::Running;
            self.phase_started_at = Some(now);
        } else {
            self.pending = Some(next);
            self.state = TimerState::WaitingForUser;
            self.phase_started_at = None;
        }

        tracing::info!(
            phase = %completed,
            next = %next,
            auto_started,
            sessions_today = self.sessions_completed_today,
            "phase completed"
        );

        Event::PhaseCompleted {
            session,
            note,
            next_phase: next,
            auto_started,
            sessions_completed_today: self.sessions_completed_today,
            at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn settings(work: u32, short: u32, long: u32, interval: u32) -> PomodoroSettings {
        PomodoroSettings {
            work_duration: work,
            short_break_duration: short,
            long_break_duration: long,
            long_break_interval: interval,
            ..Default::default()
        }
    }

    fn engine_with(settings: PomodoroSettings) -> TimerEngine {
        TimerEngine::new(
            SessionContext::new("tester"),
            settings,
            Arc::new(ManualClock::new(Utc::now())),
        )
    }

    fn run_out(engine: &mut TimerEngine) -> Option<Event> {
        let mut last = None;
        while engine.is_active() && last.is_none() {
            last = engine.tick();
        }
        last
    }

    #[test]
    fn new_engine_is_idle_with_full_focus() {
        let engine = engine_with(PomodoroSettings::default());
        assert_eq!(engine.state(), TimerState::Idle);
        assert_eq!(engine.phase(), Phase::Focus);
        assert_eq!(engine.remaining_secs(), 25 * 60);
        assert!(!engine.is_active());
        assert!(!engine.is_waiting_for_user());
    }

    #[test]
    fn start_pause_start() {
        let mut engine = engine_with(PomodoroSettings::default());
        assert!(engine.start().is_some());
        assert_eq!(engine.state(), TimerState::Running);
        assert!(engine.start().is_none());

        engine.tick();
        engine.tick();
        let before = engine.remaining_secs();

        assert!(engine.pause().is_some());
        assert_eq!(engine.state(), TimerState::Paused);
        assert!(engine.pause().is_none());

        assert!(matches!(engine.start(), Some(Event::TimerResumed { .. })));
        assert_eq!(engine.remaining_secs(), before);
    }

    #[test]
    fn tick_ignored_unless_running() {
        let mut engine = engine_with(PomodoroSettings::default());
        assert!(engine.tick().is_none());
        assert_eq!(engine.remaining_secs(), 25 * 60);

        engine.start();
        engine.pause();
        engine.tick();
        assert_eq!(engine.remaining_secs(), 25 * 60);
    }

    #[test]
    fn focus_completion_waits_for_user() {
        let mut engine = engine_with(settings(1, 1, 2, 4));
        engine.start();
        for _ in 0..59 {
            assert!(engine.tick().is_none());
        }
        let event = engine.tick().unwrap();
        match event {
            Event::PhaseCompleted {
                session,
                next_phase,
                auto_started,
                sessions_completed_today,
                ..
            } => {
                assert_eq!(session.phase, Phase::Focus);
                assert_eq!(session.duration_min, 1);
                assert_eq!(next_phase, Phase::ShortBreak);
                assert!(!auto_started);
                assert_eq!(sessions_completed_today, 1);
            }
            other => panic!("Expected PhaseCompleted, got {other:?}"),
        }
        assert_eq!(engine.state(), TimerState::WaitingForUser);
        assert_eq!(engine.pending_phase(), Some(Phase::ShortBreak));
        assert_eq!(engine.remaining_secs(), 0);

        // Countdown does not move while waiting.
        assert!(engine.tick().is_none());
        assert_eq!(engine.state(), TimerState::WaitingForUser);

        engine.start();
        assert_eq!(engine.state(), TimerState::Running);
        assert_eq!(engine.phase(), Phase::ShortBreak);
        assert_eq!(engine.remaining_secs(), 60);
        assert!(engine.pending_phase().is_none());
    }

    #[test]
    fn auto_start_break_runs_immediately() {
        let mut s = settings(1, 2, 3, 4);
        s.auto_start_breaks = true;
        let mut engine = engine_with(s);
        engine.start();
        let event = run_out(&mut engine).unwrap();
        assert!(matches!(
            event,
            Event::PhaseCompleted {
                auto_started: true,
                ..
            }
        ));
        assert_eq!(engine.state(), TimerState::Running);
        assert_eq!(engine.phase(), Phase::ShortBreak);
        assert_eq!(engine.remaining_secs(), 120);
    }

    #[test]
    fn interval_of_one_always_long_break() {
        let mut engine = engine_with(settings(1, 1, 1, 1));
        for round in 1..=3 {
            engine.start();
            run_out(&mut engine);
            assert_eq!(engine.pending_phase(), Some(Phase::LongBreak), "round {round}");
            engine.start();
            run_out(&mut engine);
            assert_eq!(engine.pending_phase(), Some(Phase::Focus));
        }
    }

    #[test]
    fn reset_restores_full_duration() {
        let mut engine = engine_with(settings(1, 1, 1, 4));
        engine.start();
        engine.tick();
        engine.reset();
        assert_eq!(engine.state(), TimerState::Idle);
        assert_eq!(engine.remaining_secs(), 60);
        assert_eq!(engine.phase(), Phase::Focus);
    }

    #[test]
    fn reset_while_waiting_adopts_pending_phase() {
        let mut engine = engine_with(settings(1, 3, 1, 4));
        engine.start();
        run_out(&mut engine);
        assert!(engine.is_waiting_for_user());

        engine.reset();
        assert_eq!(engine.state(), TimerState::Idle);
        assert_eq!(engine.phase(), Phase::ShortBreak);
        assert_eq!(engine.remaining_secs(), 180);
        assert!(!engine.is_waiting_for_user());
        assert!(engine.pending_phase().is_none());
    }

    #[test]
    fn settings_change_keeps_current_countdown() {
        let mut engine = engine_with(settings(1, 1, 1, 4));
        engine.start();
        engine.tick();
        engine.set_settings(settings(50, 1, 1, 4));
        assert_eq!(engine.remaining_secs(), 59);
        assert_eq!(engine.total_secs(), 60);

        engine.reset();
        assert_eq!(engine.remaining_secs(), 50 * 60);
    }

    #[test]
    fn settings_change_reloads_unstarted_phase() {
        let mut engine = engine_with(settings(25, 5, 15, 4));
        engine.set_settings(settings(50, 5, 15, 4));
        assert_eq!(engine.remaining_secs(), 50 * 60);
        assert_eq!(engine.total_secs(), 50 * 60);

        engine.start();
        assert_eq!(engine.remaining_secs(), 50 * 60);
    }

    #[test]
    fn settings_change_keeps_paused_and_waiting_phases() {
        let mut engine = engine_with(settings(1, 3, 1, 4));
        engine.start();
        engine.tick();
        engine.pause();
        engine.set_settings(settings(10, 3, 1, 4));
        assert_eq!(engine.remaining_secs(), 59);

        engine.start();
        run_out(&mut engine);
        assert_eq!(engine.state(), TimerState::WaitingForUser);
        engine.set_settings(settings(10, 7, 1, 4));
        assert_eq!(engine.remaining_secs(), 0);
        assert_eq!(engine.pending_phase(), Some(Phase::ShortBreak));

        engine.start();
        assert_eq!(engine.remaining_secs(), 7 * 60);
    }

    #[test]
    fn note_flushed_only_on_focus_completion() {
        let mut engine = engine_with(settings(1, 1, 1, 4));
        engine.set_note("wrote tests");
        engine.start();
        match run_out(&mut engine).unwrap() {
            Event::PhaseCompleted { session, note, .. } => {
                let note = note.unwrap();
                assert_eq!(note.session_id, session.id);
                assert_eq!(note.text, "wrote tests");
                assert_eq!(session.note.as_deref(), Some("wrote tests"));
            }
            other => panic!("Expected PhaseCompleted, got {other:?}"),
        }
        assert_eq!(engine.note(), "");

        engine.set_note("during break");
        engine.start();
        match run_out(&mut engine).unwrap() {
            Event::PhaseCompleted { session, note, .. } => {
                assert_eq!(session.phase, Phase::ShortBreak);
                assert!(note.is_none());
            }
            other => panic!("Expected PhaseCompleted, got {other:?}"),
        }
        assert_eq!(engine.note(), "during break");
    }

    #[test]
    fn skip_moves_past_phase_without_counting() {
        let mut engine = engine_with(settings(1, 1, 1, 4));
        engine.start();
        engine.tick();
        assert!(matches!(
            engine.skip(),
            Some(Event::PhaseSkipped {
                from: Phase::Focus,
                to: Phase::ShortBreak,
                ..
            })
        ));
        assert_eq!(engine.state(), TimerState::Idle);
        assert_eq!(engine.sessions_completed_today(), 0);
        assert_eq!(engine.remaining_secs(), 60);
    }

    #[test]
    fn skip_while_waiting_skips_pending() {
        let mut engine = engine_with(settings(1, 1, 1, 4));
        engine.start();
        run_out(&mut engine);
        assert_eq!(engine.pending_phase(), Some(Phase::ShortBreak));

        engine.skip();
        assert_eq!(engine.phase(), Phase::Focus);
        assert_eq!(engine.state(), TimerState::Idle);
        assert!(engine.pending_phase().is_none());
    }

    #[test]
    fn record_times_come_from_clock() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let mut engine = TimerEngine::new(
            SessionContext::new("tester"),
            settings(1, 1, 1, 4),
            clock.clone(),
        );
        engine.start();
        clock.advance(Duration::seconds(60));
        match run_out(&mut engine).unwrap() {
            Event::PhaseCompleted { session, .. } => {
                assert_eq!(session.started_at, start);
                assert_eq!(session.completed_at, start + Duration::seconds(60));
            }
            other => panic!("Expected PhaseCompleted, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut engine = engine_with(settings(1, 1, 1, 4));
        engine.set_note("n");
        engine.start();
        engine.tick();
        let snap = engine.snapshot();
        assert_eq!(snap.state, TimerState::Running);
        assert!(snap.is_active);
        assert!(!snap.is_waiting_for_user);
        assert_eq!(snap.remaining_secs, 59);
        assert_eq!(snap.total_secs, 60);
        assert_eq!(snap.note, "n");
        assert!(snap.progress > 0.0 && snap.progress < 1.0);
    }
}
