//! Integration tests for the command-driven timer session.
//!
//! Ticks are sent by hand so every scenario is deterministic; one test runs
//! the wall-clock ticker with a short period.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pomoflow_core::{
    ChannelNotifier, Database, Event, ManualClock, MemoryStore, Notice, NoticeLevel, Phase,
    PomodoroSettings, ServiceDeps, SessionContext, SettingsPatch, SettingsStore, TimerHandle,
    TimerService, TimerState, TracingNotifier,
};
use tokio::sync::mpsc;

type Notices = mpsc::UnboundedReceiver<Notice>;

fn short_settings() -> PomodoroSettings {
    PomodoroSettings {
        work_duration: 1,
        short_break_duration: 1,
        long_break_duration: 2,
        long_break_interval: 2,
        ..Default::default()
    }
}

fn deps(store: Arc<MemoryStore>) -> (ServiceDeps, Notices) {
    let (notifier, notices) = ChannelNotifier::new();
    let deps = ServiceDeps {
        settings: store.clone(),
        sessions: store,
        notifier: Arc::new(notifier),
        clock: Arc::new(ManualClock::new(Utc::now())),
    };
    (deps, notices)
}

async fn spawn_with(store: Arc<MemoryStore>) -> (TimerHandle, Notices) {
    let (deps, notices) = deps(store);
    let handle = TimerService::spawn(SessionContext::new("alice"), deps).await;
    (handle, notices)
}

async fn tick_n(handle: &TimerHandle, n: u64) {
    for _ in 0..n {
        handle.tick().await.unwrap();
    }
}

#[tokio::test]
async fn completed_focus_persists_session_and_note() {
    let store = Arc::new(MemoryStore::new());
    store.put_settings("alice", short_settings());
    let (mut handle, _notices) = spawn_with(store.clone()).await;

    handle.set_note("outlined chapter two").await.unwrap();
    handle.start().await.unwrap();
    tick_n(&handle, 60).await;

    let snap = handle.query().await.unwrap();
    assert_eq!(snap.state, TimerState::WaitingForUser);
    assert_eq!(snap.pending_phase, Some(Phase::ShortBreak));
    assert_eq!(snap.sessions_completed_today, 1);
    assert_eq!(snap.note, "");

    handle.flush().await.unwrap();
    let sessions = store.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].phase, Phase::Focus);
    assert_eq!(sessions[0].duration_min, 1);
    assert_eq!(sessions[0].user_id, "alice");

    let notes = store.notes();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].session_id, sessions[0].id);
    assert_eq!(notes[0].text, "outlined chapter two");

    let mut saw_completion = false;
    while let Some(event) = handle.try_next_event() {
        if let Event::PhaseCompleted { session, .. } = event {
            assert_eq!(session.id, sessions[0].id);
            saw_completion = true;
        }
    }
    assert!(saw_completion);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn empty_note_produces_no_note_record() {
    let store = Arc::new(MemoryStore::new());
    store.put_settings("alice", short_settings());
    let (handle, _notices) = spawn_with(store.clone()).await;

    handle.start().await.unwrap();
    tick_n(&handle, 60).await;
    handle.flush().await.unwrap();

    assert_eq!(store.sessions().len(), 1);
    assert!(store.notes().is_empty());
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn write_failure_notifies_without_rollback() {
    let store = Arc::new(MemoryStore::new());
    store.put_settings("alice", short_settings());
    store.set_fail_writes(true);
    let (handle, mut notices) = spawn_with(store.clone()).await;

    handle.set_note("will not be saved").await.unwrap();
    handle.start().await.unwrap();
    tick_n(&handle, 60).await;
    handle.flush().await.unwrap();

    let snap = handle.query().await.unwrap();
    assert_eq!(snap.state, TimerState::WaitingForUser);
    assert_eq!(snap.sessions_completed_today, 1);

    let mut errors = 0;
    while let Ok(notice) = notices.try_recv() {
        assert_eq!(notice.level, NoticeLevel::Error);
        errors += 1;
    }
    // One for the session record, one for the note.
    assert_eq!(errors, 2);
    assert!(store.sessions().is_empty());

    // The timer keeps working.
    handle.start().await.unwrap();
    assert_eq!(handle.query().await.unwrap().phase, Phase::ShortBreak);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn settings_load_failure_falls_back_to_defaults() {
    let store = Arc::new(MemoryStore::new());
    store.put_settings("alice", short_settings());
    store.set_fail_loads(true);
    let (handle, _notices) = spawn_with(store).await;

    let snap = handle.query().await.unwrap();
    assert_eq!(snap.state, TimerState::Idle);
    assert_eq!(snap.remaining_secs, 25 * 60);

    handle.start().await.unwrap();
    handle.tick().await.unwrap();
    assert_eq!(handle.query().await.unwrap().remaining_secs, 25 * 60 - 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_stored_durations_replaced_by_defaults() {
    let store = Arc::new(MemoryStore::new());
    store.put_settings(
        "alice",
        PomodoroSettings {
            work_duration: 0,
            short_break_duration: 3,
            ..Default::default()
        },
    );
    let (handle, _notices) = spawn_with(store).await;

    let snap = handle.query().await.unwrap();
    assert_eq!(snap.remaining_secs, 25 * 60);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn settings_update_applies_to_next_phase_and_persists() {
    let store = Arc::new(MemoryStore::new());
    store.put_settings("alice", short_settings());
    let (handle, _notices) = spawn_with(store.clone()).await;

    handle.start().await.unwrap();
    tick_n(&handle, 10).await;
    handle
        .update_settings(SettingsPatch {
            short_break_duration: Some(3),
            work_duration: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();

    let snap = handle.query().await.unwrap();
    assert_eq!(snap.remaining_secs, 50);
    assert_eq!(snap.total_secs, 60);

    tick_n(&handle, 50).await;
    handle.start().await.unwrap();
    let snap = handle.query().await.unwrap();
    assert_eq!(snap.phase, Phase::ShortBreak);
    assert_eq!(snap.remaining_secs, 180);

    handle.flush().await.unwrap();
    let saved = store.settings_for("alice").unwrap();
    assert_eq!(saved.short_break_duration, 3);
    assert_eq!(saved.work_duration, 2);
    assert!(saved.updated_at.is_some());
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_settings_update_is_refused() {
    let store = Arc::new(MemoryStore::new());
    store.put_settings("alice", short_settings());
    let (handle, mut notices) = spawn_with(store.clone()).await;

    handle
        .update_settings(SettingsPatch {
            long_break_interval: Some(0),
            ..Default::default()
        })
        .await
        .unwrap();
    handle.flush().await.unwrap();

    let notice = notices.try_recv().unwrap();
    assert_eq!(notice.level, NoticeLevel::Warning);
    assert_eq!(store.settings_for("alice").unwrap().long_break_interval, 2);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn settings_save_failure_keeps_new_values_in_session() {
    let store = Arc::new(MemoryStore::new());
    store.put_settings("alice", short_settings());
    let (handle, mut notices) = spawn_with(store.clone()).await;
    store.set_fail_writes(true);

    handle
        .update_settings(SettingsPatch {
            work_duration: Some(5),
            ..Default::default()
        })
        .await
        .unwrap();
    handle.reset().await.unwrap();
    handle.flush().await.unwrap();

    assert_eq!(handle.query().await.unwrap().remaining_secs, 5 * 60);
    assert_eq!(notices.try_recv().unwrap().level, NoticeLevel::Error);
    assert_eq!(store.settings_for("alice").unwrap().work_duration, 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn sqlite_backed_session_round_trip() {
    let db = Arc::new(Database::open_memory().unwrap());
    db.save(
        "alice",
        &SettingsPatch {
            work_duration: Some(1),
            auto_start_breaks: Some(true),
            ..Default::default()
        },
    )
    .unwrap();

    let deps = ServiceDeps {
        settings: db.clone(),
        sessions: db.clone(),
        notifier: Arc::new(TracingNotifier),
        clock: Arc::new(ManualClock::new(Utc::now())),
    };
    let handle = TimerService::spawn(SessionContext::new("alice"), deps).await;
    handle.set_note("sqlite note").await.unwrap();
    handle.start().await.unwrap();
    tick_n(&handle, 60).await;

    let snap = handle.query().await.unwrap();
    assert_eq!(snap.state, TimerState::Running);
    assert_eq!(snap.phase, Phase::ShortBreak);
    handle.shutdown().await.unwrap();

    let recent = db.recent_sessions("alice", 5).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].note.as_deref(), Some("sqlite note"));
    let note = db.session_note(recent[0].id).unwrap().unwrap();
    assert_eq!(note.text, "sqlite note");
    assert_eq!(db.stats_all("alice").unwrap().focus_min, 1);
}

#[tokio::test]
async fn ticker_drives_countdown_only_while_running() {
    let store = Arc::new(MemoryStore::new());
    store.put_settings("alice", short_settings());
    let (mut handle, _notices) = spawn_with(store.clone()).await;
    handle.start_ticker(Duration::from_millis(2));

    // Idle: nothing moves.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(handle.query().await.unwrap().remaining_secs, 60);

    handle.start().await.unwrap();
    let completed = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match handle.next_event().await {
                Some(Event::PhaseCompleted { session, .. }) => break session,
                Some(_) => continue,
                None => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("focus phase should finish under the ticker");
    assert_eq!(completed.phase, Phase::Focus);

    // Waiting for the user: the ticker parks.
    let snap = handle.query().await.unwrap();
    assert_eq!(snap.state, TimerState::WaitingForUser);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(handle.query().await.unwrap().state, TimerState::WaitingForUser);

    handle.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.pause().await.unwrap();
    let paused = handle.query().await.unwrap();
    assert_eq!(paused.state, TimerState::Paused);
    assert!(paused.remaining_secs < 60);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(handle.query().await.unwrap().remaining_secs, paused.remaining_secs);

    handle.shutdown().await.unwrap();
    assert_eq!(store.sessions().len(), 1);
}

#[tokio::test]
async fn commands_fail_after_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let (handle, _notices) = spawn_with(store).await;
    let commands = handle.commands();
    handle.shutdown().await.unwrap();
    assert!(commands.send(pomoflow_core::Command::Start).await.is_err());
}

/// Settings store whose save of one particular work duration is slow.
#[derive(Debug)]
struct SlowSaveStore {
    inner: MemoryStore,
    slow_work_duration: u32,
}

impl SettingsStore for SlowSaveStore {
    fn load(&self, user_id: &str) -> pomoflow_core::error::Result<PomodoroSettings> {
        self.inner.load(user_id)
    }

    fn save(
        &self,
        user_id: &str,
        patch: &SettingsPatch,
    ) -> pomoflow_core::error::Result<PomodoroSettings> {
        if patch.work_duration == Some(self.slow_work_duration) {
            std::thread::sleep(Duration::from_millis(300));
        }
        self.inner.save(user_id, patch)
    }
}

#[tokio::test]
async fn settings_saves_land_in_issue_order() {
    let store = Arc::new(SlowSaveStore {
        inner: MemoryStore::new(),
        slow_work_duration: 30,
    });
    let sessions = Arc::new(MemoryStore::new());
    let deps = ServiceDeps {
        settings: store.clone(),
        sessions,
        notifier: Arc::new(TracingNotifier),
        clock: Arc::new(ManualClock::new(Utc::now())),
    };
    let handle = TimerService::spawn(SessionContext::new("alice"), deps).await;

    for work in [30, 40] {
        handle
            .update_settings(SettingsPatch {
                work_duration: Some(work),
                ..Default::default()
            })
            .await
            .unwrap();
    }
    handle.flush().await.unwrap();
    handle.reset().await.unwrap();

    let snap = handle.query().await.unwrap();
    assert_eq!(snap.total_secs, 40 * 60);
    assert_eq!(store.inner.settings_for("alice").unwrap().work_duration, 40);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn consecutive_edits_merge_in_store() {
    let store = Arc::new(MemoryStore::new());
    let (handle, mut notices) = spawn_with(store.clone()).await;

    let edits = [("work_duration", "45"), ("short_break_duration", "8"), ("work_duration", "50")];
    for (key, value) in edits {
        let patch = SettingsPatch::from_key_value(key, value).unwrap();
        handle.update_settings(patch).await.unwrap();
    }
    handle.flush().await.unwrap();

    let saved = store.settings_for("alice").unwrap();
    assert_eq!(saved.work_duration, 50);
    assert_eq!(saved.short_break_duration, 8);
    assert!(notices.try_recv().is_err());
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn edit_before_first_start_sets_focus_length() {
    let store = Arc::new(MemoryStore::new());
    let (handle, _notices) = spawn_with(store).await;

    handle
        .update_settings(SettingsPatch {
            work_duration: Some(50),
            ..Default::default()
        })
        .await
        .unwrap();
    handle.start().await.unwrap();

    let snap = handle.query().await.unwrap();
    assert_eq!(snap.state, TimerState::Running);
    assert_eq!(snap.remaining_secs, 50 * 60);
    assert_eq!(snap.total_secs, 50 * 60);
    handle.shutdown().await.unwrap();
}
