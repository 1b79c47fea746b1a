use chrono::Utc;
use clap::Subcommand;
use pomoflow_core::Config;

use crate::common::{open_database, print_pretty, CliResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's stats
    Today,
    /// All-time stats
    All,
}

pub fn run(action: StatsAction, config: &Config) -> CliResult {
    let db = open_database(config)?;

    let stats = match action {
        StatsAction::Today => db.stats_today(&config.user_id, config.day_boundary, Utc::now())?,
        StatsAction::All => db.stats_all(&config.user_id)?,
    };
    print_pretty(&stats)
}
