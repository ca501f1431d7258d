//! Snapshot record and its time windows

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::interpretation::Interpretation;
use super::observed::ObservedState;

/// Current layout of the `interpretation` document
pub const INTERPRETATION_VERSION: u32 = 3;

/// Aggregation horizon of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl PeriodType {
    pub const ALL: [PeriodType; 4] = [
        PeriodType::Hourly,
        PeriodType::Daily,
        PeriodType::Weekly,
        PeriodType::Monthly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Hourly => "hourly",
            PeriodType::Daily => "daily",
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
        }
    }

    /// Most recent window of this period that has fully closed at `now`
    pub fn latest_complete_window(&self, now: DateTime<Utc>) -> SnapshotWindow {
        let today = now.date_naive();
        let day_start = start_of_day(today);
        match self {
            PeriodType::Hourly => {
                let end = day_start + Duration::hours(i64::from(now.hour()));
                SnapshotWindow::new(end - Duration::hours(1), end)
            }
            PeriodType::Daily => SnapshotWindow::new(day_start - Duration::days(1), day_start),
            PeriodType::Weekly => {
                let offset = i64::from(today.weekday().num_days_from_monday());
                let end = day_start - Duration::days(offset);
                SnapshotWindow::new(end - Duration::days(7), end)
            }
            PeriodType::Monthly => {
                let month_start = first_of_month(today);
                let prev_month_start = first_of_month(month_start - Duration::days(1));
                SnapshotWindow::new(start_of_day(prev_month_start), start_of_day(month_start))
            }
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(PeriodType::Hourly),
            "daily" => Ok(PeriodType::Daily),
            "weekly" => Ok(PeriodType::Weekly),
            "monthly" => Ok(PeriodType::Monthly),
            other => Err(format!("Unknown period type: {}", other)),
        }
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SnapshotWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The UTC calendar day `date`
    pub fn for_day(date: NaiveDate) -> Self {
        let start = start_of_day(date);
        Self::new(start, start + Duration::days(1))
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Persisted, time-windowed aggregate for one symbol and period type
///
/// Natural key: (symbol, period_type, snapshot_start).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: String,
    pub period_type: PeriodType,
    pub snapshot_start: DateTime<Utc>,
    pub snapshot_end: DateTime<Utc>,
    pub message_count: u32,
    pub unique_authors: u32,
    pub data_confidence: f64,
    pub observed_state: ObservedState,
    pub interpretation: Interpretation,
    pub created_at: DateTime<Utc>,
    pub interpretation_version: u32,
}
