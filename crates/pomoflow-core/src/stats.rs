//! Aggregates over completed sessions and the day boundary that scopes
//! "today".

use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Which midnight starts a new day for `sessions_completed_today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayBoundary {
    #[default]
    Local,
    Utc,
}

/// Start of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>, boundary: DayBoundary) -> DateTime<Utc> {
    match boundary {
        DayBoundary::Utc => now.date_naive().and_time(NaiveTime::MIN).and_utc(),
        DayBoundary::Local => {
            let midnight = now
                .with_timezone(&Local)
                .date_naive()
                .and_time(NaiveTime::MIN);
            // A DST jump can skip local midnight; fall back to reading it as UTC.
            Local
                .from_local_datetime(&midnight)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| midnight.and_utc())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Stats {
    /// Every completed phase, breaks included.
    pub total_records: u64,
    pub focus_sessions: u64,
    pub focus_min: u64,
    pub break_min: u64,
}

impl Stats {
    pub fn focus_hours(&self) -> f64 {
        self.focus_min as f64 / 60.0
    }
}
