use clap::Subcommand;
use pomoflow_core::Config;

use crate::common::{open_database, print_pretty, CliResult};

#[derive(Subcommand)]
pub enum SessionsAction {
    /// Most recent completed phases, newest first
    List {
        /// Maximum number of records
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

pub fn run(action: SessionsAction, config: &Config) -> CliResult {
    let db = open_database(config)?;

    match action {
        SessionsAction::List { limit } => {
            let sessions = db.recent_sessions(&config.user_id, limit)?;
            print_pretty(&sessions)?;
        }
    }
    Ok(())
}
