//! Command-driven session runner.
//!
//! Wraps a [`TimerEngine`] in a task that owns it exclusively. Front ends
//! send [`Command`]s over a channel and read back snapshots and events.
//! Completed sessions, notes and settings edits are persisted by background
//! jobs; the countdown never waits on storage and a storage failure only
//! produces a notice.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};

use super::engine::{Snapshot, TimerEngine};
use super::notes::SessionNote;
use super::record::CompletedSession;
use super::ticker::spawn_ticker;
use super::SessionContext;
use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::notify::{Notice, Notifier};
use crate::settings::{PomodoroSettings, SettingsPatch};
use crate::storage::{SessionSink, SettingsStore};

const COMMAND_BUFFER: usize = 64;

#[derive(Debug)]
pub enum Command {
    Start,
    Pause,
    Reset,
    Skip,
    /// One second elapsed.
    Tick,
    SetNote(String),
    UpdateSettings(SettingsPatch),
    /// Reply with the current snapshot once every earlier command is applied.
    Query(oneshot::Sender<Snapshot>),
    /// Reply once every outstanding persistence job has finished.
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Collaborators the runner talks to.
#[derive(Clone)]
pub struct ServiceDeps {
    pub settings: Arc<dyn SettingsStore>,
    pub sessions: Arc<dyn SessionSink>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

pub struct TimerService;

impl TimerService {
    /// Load the user's settings and start a runner task.
    ///
    /// A failed or corrupted settings load falls back to defaults; it never
    /// prevents the timer from starting.
    pub async fn spawn(ctx: SessionContext, deps: ServiceDeps) -> TimerHandle {
        let settings = load_settings(&deps.settings, &ctx.user_id).await;
        let engine = TimerEngine::new(ctx, settings, Arc::clone(&deps.clock));
        Self::spawn_with_engine(engine, deps)
    }

    /// Start a runner around an already-built engine.
    pub fn spawn_with_engine(engine: TimerEngine, deps: ServiceDeps) -> TimerHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let runner = Runner {
            engine,
            deps,
            jobs: JoinSet::new(),
            last_settings_save: None,
            snapshot_tx,
            event_tx,
        };
        let task = tokio::spawn(runner.run(cmd_rx));

        TimerHandle {
            commands: cmd_tx,
            snapshots: snapshot_rx,
            events: event_rx,
            task: Some(task),
            ticker: None,
        }
    }
}

async fn load_settings(store: &Arc<dyn SettingsStore>, user_id: &str) -> PomodoroSettings {
    let store = Arc::clone(store);
    let user = user_id.to_string();
    match tokio::task::spawn_blocking(move || store.load(&user)).await {
        Ok(Ok(mut settings)) => {
            let repaired = settings.sanitize();
            if !repaired.is_empty() {
                tracing::warn!(fields = ?repaired, "settings had invalid values; using defaults");
            }
            settings
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "failed to load settings; using defaults");
            PomodoroSettings::default()
        }
        Err(e) => {
            tracing::warn!(error = %e, "settings load task failed; using defaults");
            PomodoroSettings::default()
        }
    }
}

struct Runner {
    engine: TimerEngine,
    deps: ServiceDeps,
    jobs: JoinSet<()>,
    /// Resolves once the most recently issued settings save has finished.
    last_settings_save: Option<oneshot::Receiver<()>>,
    snapshot_tx: watch::Sender<Snapshot>,
    event_tx: mpsc::UnboundedSender<Event>,
}

impl Runner {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle(cmd).await {
                        break;
                    }
                }
                Some(joined) = self.jobs.join_next(), if !self.jobs.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "persistence job panicked");
                    }
                }
            }
        }
        self.drain_jobs().await;
        tracing::debug!(user = self.engine.user_id(), "timer session closed");
    }

    /// Returns false when the runner should stop.
    async fn handle(&mut self, cmd: Command) -> bool {
        let event = match cmd {
            Command::Start => self.engine.start(),
            Command::Pause => self.engine.pause(),
            Command::Reset => self.engine.reset(),
            Command::Skip => self.engine.skip(),
            Command::Tick => self.engine.tick(),
            Command::SetNote(text) => {
                self.engine.set_note(text);
                None
            }
            Command::UpdateSettings(patch) => self.update_settings(patch),
            Command::Query(reply) => {
                let _ = reply.send(self.engine.snapshot());
                return true;
            }
            Command::Flush(reply) => {
                self.drain_jobs().await;
                let _ = reply.send(());
                return true;
            }
            Command::Shutdown => return false,
        };

        if let Some(event) = event {
            if let Event::PhaseCompleted { session, note, .. } = &event {
                self.persist_completion(session.clone(), note.clone());
            }
            // A closed event stream only means nobody renders events.
            let _ = self.event_tx.send(event);
        }
        self.snapshot_tx.send_replace(self.engine.snapshot());
        true
    }

    fn update_settings(&mut self, patch: SettingsPatch) -> Option<Event> {
        let next = match self.engine.settings().merged(&patch) {
            Ok(next) => next,
            Err(e) => {
                self.deps
                    .notifier
                    .notify(Notice::warning(format!("Settings not changed: {e}")));
                return None;
            }
        };
        self.engine.set_settings(next.clone());

        self.save_settings(patch);

        Some(Event::SettingsChanged {
            settings: next,
            at: self.deps.clock.now(),
        })
    }

    /// Queue a settings save behind every earlier one so the store ends up
    /// with the last edit the user made.
    fn save_settings(&mut self, patch: SettingsPatch) {
        let store = Arc::clone(&self.deps.settings);
        let notifier = Arc::clone(&self.deps.notifier);
        let user = self.engine.user_id().to_string();
        let previous = self.last_settings_save.take();
        let (done_tx, done_rx) = oneshot::channel();
        self.last_settings_save = Some(done_rx);

        self.jobs.spawn(async move {
            if let Some(previous) = previous {
                // An error only means the earlier job is gone; either way it is over.
                let _ = previous.await;
            }
            let saved = tokio::task::spawn_blocking(move || store.save(&user, &patch)).await;
            match saved {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "failed to save settings");
                    notifier.notify(Notice::error(format!("Could not save settings: {e}")));
                }
                Err(e) => tracing::error!(error = %e, "settings save task failed"),
            }
            let _ = done_tx.send(());
        });
    }

    fn persist_completion(&mut self, session: CompletedSession, note: Option<SessionNote>) {
        let sink = Arc::clone(&self.deps.sessions);
        let notifier = Arc::clone(&self.deps.notifier);
        self.jobs.spawn_blocking(move || {
            if let Err(e) = sink.record_session(&session) {
                tracing::warn!(error = %e, session = %session.id, "failed to record session");
                notifier.notify(Notice::error(format!("Could not save completed session: {e}")));
            }
            if let Some(note) = note {
                if let Err(e) = sink.save_note(&note) {
                    tracing::warn!(error = %e, session = %note.session_id, "failed to save note");
                    notifier.notify(Notice::error(format!("Could not save session note: {e}")));
                }
            }
        });
    }

    async fn drain_jobs(&mut self) {
        while let Some(joined) = self.jobs.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "persistence job panicked");
            }
        }
    }
}

/// Front-end side of a running timer session.
///
/// Dropping the handle stops the ticker; the runner exits once every command
/// sender is gone.
pub struct TimerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    events: mpsc::UnboundedReceiver<Event>,
    task: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl TimerHandle {
    pub async fn send(&self, cmd: Command) -> Result<()> {
        self.commands.send(cmd).await?;
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.send(Command::Start).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(Command::Pause).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(Command::Reset).await
    }

    pub async fn skip(&self) -> Result<()> {
        self.send(Command::Skip).await
    }

    pub async fn tick(&self) -> Result<()> {
        self.send(Command::Tick).await
    }

    pub async fn set_note(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::SetNote(text.into())).await
    }

    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<()> {
        self.send(Command::UpdateSettings(patch)).await
    }

    /// Snapshot after every previously sent command has been applied.
    pub async fn query(&self) -> Result<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Query(tx)).await?;
        rx.await.map_err(|_| CoreError::ChannelClosed)
    }

    /// Wait until pending persistence work has finished.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush(tx)).await?;
        rx.await.map_err(|_| CoreError::ChannelClosed)
    }

    /// Latest published snapshot, without waiting.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn commands(&self) -> mpsc::Sender<Command> {
        self.commands.clone()
    }

    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    /// Drive the session from the wall clock, one tick per `period` while running.
    pub fn start_ticker(&mut self, period: Duration) {
        if let Some(old) = self.ticker.take() {
            old.abort();
        }
        self.ticker = Some(spawn_ticker(period, self.commands.clone(), self.subscribe()));
    }

    /// Stop the ticker, let outstanding persistence finish and end the runner.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        // Runner may already be gone; that is a finished shutdown.
        let _ = self.commands.send(Command::Shutdown).await;
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| CoreError::Custom(format!("timer task failed: {e}")))?;
        }
        Ok(())
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
