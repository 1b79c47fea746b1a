//! Wall-clock tick source.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::engine::{Snapshot, TimerState};
use super::service::Command;

/// Send `Command::Tick` every `period` while the published state is `Running`.
///
/// The task parks while the timer is idle, paused or waiting for the user, and
/// exits once the runner stops publishing snapshots or accepting commands.
/// Pausing and resuming restarts the current period.
pub fn spawn_ticker(
    period: Duration,
    commands: mpsc::Sender<Command>,
    mut state: watch::Receiver<Snapshot>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let running = state
                .wait_for(|s| s.state == TimerState::Running)
                .await
                .map(|_| ());
            if running.is_err() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(period) => {
                    let still_running = state.borrow().state == TimerState::Running;
                    if still_running && commands.send(Command::Tick).await.is_err() {
                        break;
                    }
                }
                stopped = async {
                    state
                        .wait_for(|s| s.state != TimerState::Running)
                        .await
                        .map(|_| ())
                } => {
                    if stopped.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("ticker stopped");
    })
}
