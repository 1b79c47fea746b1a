use clap::Subcommand;
use pomoflow_core::{Config, SettingsPatch, SettingsStore};

use crate::common::{open_database, print_pretty, CliResult};

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the current timer settings
    Show,
    /// Change one setting (e.g. `work_duration 50`)
    Set {
        /// Setting name
        key: String,
        /// New value
        value: String,
    },
    /// Restore the default settings
    Reset,
}

pub fn run(action: SettingsAction, config: &Config) -> CliResult {
    let db = open_database(config)?;
    let user = config.user_id.as_str();

    match action {
        SettingsAction::Show => print_pretty(&db.load(user)?)?,
        SettingsAction::Set { key, value } => {
            let patch = SettingsPatch::from_key_value(&key, &value)?;
            print_pretty(&db.save(user, &patch)?)?;
        }
        SettingsAction::Reset => print_pretty(&db.reset_settings(user)?)?,
    }
    Ok(())
}
