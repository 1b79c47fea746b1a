//! Live timer session.
//!
//! Reads one command per line from stdin and writes events, notices and
//! status snapshots to stdout as JSON lines:
//!
//! ```text
//! start | pause | reset | skip | status | quit
//! note <text>
//! set <setting> <value>
//! ```

use std::sync::Arc;

use chrono::Utc;
use pomoflow_core::{
    start_of_day, ChannelNotifier, Config, Event, Notice, ServiceDeps, SessionContext,
    SettingsPatch, SystemClock, TimerHandle, TimerService,
};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::common::{open_database, print_line, CliResult};

#[derive(Serialize)]
#[serde(tag = "type")]
enum Output<'a> {
    Notice(&'a Notice),
    Error { message: String },
}

pub fn run(config: &Config) -> CliResult {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(session(config));
    // A pending stdin read would otherwise hold the runtime open after `quit`.
    runtime.shutdown_background();
    result
}

async fn session(config: &Config) -> CliResult {
    let db = Arc::new(open_database(config)?);
    let today = db.focus_sessions_since(
        &config.user_id,
        start_of_day(Utc::now(), config.day_boundary),
    )?;

    let (notifier, mut notices) = ChannelNotifier::new();
    let deps = ServiceDeps {
        settings: db.clone(),
        sessions: db,
        notifier: Arc::new(notifier),
        clock: Arc::new(SystemClock),
    };
    let ctx = SessionContext::new(config.user_id.as_str()).with_sessions_today(today);
    let mut handle = TimerService::spawn(ctx, deps).await;
    handle.start_ticker(config.tick_interval());
    tracing::info!(user = %config.user_id, sessions_today = today, "timer session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !dispatch(&handle, line.trim()).await? {
                    break;
                }
            }
            Some(event) = handle.next_event() => print_line(&event)?,
            Some(notice) = notices.recv() => print_line(&Output::Notice(&notice))?,
            else => break,
        }
    }

    handle.flush().await?;
    while let Some(event) = handle.try_next_event() {
        print_line(&event)?;
    }
    while let Ok(notice) = notices.try_recv() {
        print_line(&Output::Notice(&notice))?;
    }
    handle.shutdown().await?;
    tracing::info!("timer session ended");
    Ok(())
}

/// Returns false when the session should end.
async fn dispatch(handle: &TimerHandle, line: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word {
        "" => {}
        "start" => handle.start().await?,
        "pause" => handle.pause().await?,
        "reset" => handle.reset().await?,
        "skip" => handle.skip().await?,
        "note" => handle.set_note(rest).await?,
        "status" => print_line(&Event::StateSnapshot(handle.query().await?))?,
        "set" => match parse_setting(rest) {
            Ok(patch) => handle.update_settings(patch).await?,
            Err(message) => print_line(&Output::Error { message })?,
        },
        "quit" | "exit" => return Ok(false),
        other => print_line(&Output::Error {
            message: format!("unknown command: {other}"),
        })?,
    }
    Ok(true)
}

fn parse_setting(args: &str) -> Result<SettingsPatch, String> {
    let (key, value) = args
        .split_once(char::is_whitespace)
        .ok_or_else(|| "usage: set <setting> <value>".to_string())?;
    SettingsPatch::from_key_value(key, value.trim()).map_err(|e| e.to_string())
}
