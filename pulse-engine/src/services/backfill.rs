//! Historical gap filling
//!
//! The core is a plain [`Stream`] of [`BackfillEvent`]s; the HTTP layer
//! frames it as SSE. Dates run one after another through the same
//! [`SnapshotPipeline`] as scheduled runs. Every write is an upsert, so a
//! client disconnect between dates leaves the store consistent and a rerun
//! picks up where it stopped.

use async_stream::stream;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, Weekday};
use futures::Stream;
use pulse_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::snapshots;
use crate::models::snapshot::{PeriodType, SnapshotWindow};

use super::pipeline::{SnapshotPipeline, UnitOutcome};
use super::signal_metrics;

/// Longest accepted range, inclusive of both ends
pub const MAX_RANGE_DAYS: i64 = 366;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackfillAction {
    #[default]
    Backfill,
    RecomputeNcs,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillRequest {
    #[serde(default)]
    pub action: BackfillAction,
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_true")]
    pub skip_insufficient_data: bool,
}

impl BackfillRequest {
    /// Check the range and normalize the symbol
    pub fn validate(mut self) -> Result<Self> {
        self.symbol = self.symbol.trim().to_ascii_uppercase();
        if self.symbol.is_empty() {
            return Err(Error::InvalidInput("symbol is required".to_string()));
        }
        if self.end_date < self.start_date {
            return Err(Error::InvalidInput(
                "endDate must not be before startDate".to_string(),
            ));
        }
        let span = (self.end_date - self.start_date).num_days() + 1;
        if span > MAX_RANGE_DAYS {
            return Err(Error::InvalidInput(format!(
                "Range of {} days exceeds the {} day limit",
                span, MAX_RANGE_DAYS
            )));
        }
        Ok(self)
    }
}

/// Progress of one backfill, in emission order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackfillEvent {
    Start {
        action: BackfillAction,
        symbol: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        /// Units that will be processed
        total: usize,
        /// Weekdays already covered by a snapshot
        existing: usize,
        dry_run: bool,
    },
    Progress {
        date: NaiveDate,
        current: usize,
        total: usize,
    },
    Skipped {
        date: NaiveDate,
        reason: String,
        message_count: u32,
    },
    Created {
        date: NaiveDate,
        message_count: u32,
        data_confidence: f64,
        coherence_score: u32,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        date: Option<NaiveDate>,
        message: String,
    },
    Complete {
        created: usize,
        skipped: usize,
        errors: usize,
        dry_run: bool,
    },
}

/// Monday-to-Friday dates in `[start, end]`
pub fn weekday_dates(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

#[derive(Default)]
struct Tally {
    created: usize,
    skipped: usize,
    errors: usize,
}

impl Tally {
    fn complete(&self, dry_run: bool) -> BackfillEvent {
        BackfillEvent::Complete {
            created: self.created,
            skipped: self.skipped,
            errors: self.errors,
            dry_run,
        }
    }
}

#[derive(Clone)]
pub struct BackfillStreamer {
    pipeline: SnapshotPipeline,
    inter_date_delay: Duration,
}

impl BackfillStreamer {
    pub fn new(pipeline: SnapshotPipeline, inter_date_delay: Duration) -> Self {
        Self {
            pipeline,
            inter_date_delay,
        }
    }

    /// Events for a validated request
    pub fn stream(&self, request: BackfillRequest) -> impl Stream<Item = BackfillEvent> + Send + 'static {
        let this = self.clone();
        stream! {
            info!(
                symbol = %request.symbol,
                action = ?request.action,
                start = %request.start_date,
                end = %request.end_date,
                dry_run = request.dry_run,
                "Backfill started"
            );
            match request.action {
                BackfillAction::Backfill => {
                    for await event in this.backfill(request) {
                        yield event;
                    }
                }
                BackfillAction::RecomputeNcs => {
                    for await event in this.recompute_ncs(request) {
                        yield event;
                    }
                }
            }
        }
    }

    fn range_bounds(request: &BackfillRequest) -> (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>) {
        let from = request.start_date.and_time(NaiveTime::MIN).and_utc();
        let to = (request.end_date + ChronoDuration::days(1)).and_time(NaiveTime::MIN).and_utc();
        (from, to)
    }

    fn backfill(self, request: BackfillRequest) -> impl Stream<Item = BackfillEvent> + Send {
        stream! {
            let (from, to) = Self::range_bounds(&request);
            let existing: HashSet<NaiveDate> = match snapshots::existing_starts(
                self.pipeline.db(),
                &request.symbol,
                PeriodType::Daily,
                from,
                to,
            )
            .await
            {
                Ok(starts) => starts.into_iter().map(|s| s.date_naive()).collect(),
                Err(e) => {
                    warn!(error = %e, "Backfill could not list existing snapshots");
                    yield BackfillEvent::Error { date: None, message: e.to_string() };
                    yield Tally { errors: 1, ..Default::default() }.complete(request.dry_run);
                    return;
                }
            };

            let weekdays = weekday_dates(request.start_date, request.end_date);
            let already = weekdays.iter().filter(|d| existing.contains(d)).count();
            let pending: Vec<NaiveDate> =
                weekdays.into_iter().filter(|d| !existing.contains(d)).collect();
            let total = pending.len();

            yield BackfillEvent::Start {
                action: BackfillAction::Backfill,
                symbol: request.symbol.clone(),
                start_date: request.start_date,
                end_date: request.end_date,
                total,
                existing: already,
                dry_run: request.dry_run,
            };

            let mut tally = Tally::default();
            if request.dry_run {
                yield tally.complete(true);
                return;
            }

            for (index, date) in pending.iter().copied().enumerate() {
                yield BackfillEvent::Progress { date, current: index + 1, total };

                let window = SnapshotWindow::for_day(date);
                match self.pipeline.process(&request.symbol, PeriodType::Daily, window, window.end).await {
                    UnitOutcome::Created(snapshot) => {
                        tally.created += 1;
                        yield BackfillEvent::Created {
                            date,
                            message_count: snapshot.message_count,
                            data_confidence: snapshot.data_confidence,
                            coherence_score: snapshot.observed_state.coherence.score,
                        };
                    }
                    UnitOutcome::Skipped { reason, message_count } if request.skip_insufficient_data => {
                        tally.skipped += 1;
                        yield BackfillEvent::Skipped { date, reason, message_count };
                    }
                    UnitOutcome::Skipped { reason, message_count } => {
                        tally.errors += 1;
                        yield BackfillEvent::Error {
                            date: Some(date),
                            message: format!("{} ({} qualifying)", reason, message_count),
                        };
                    }
                    UnitOutcome::Failed { error } => {
                        tally.errors += 1;
                        yield BackfillEvent::Error { date: Some(date), message: error };
                    }
                }

                if index + 1 < total && !self.inter_date_delay.is_zero() {
                    tokio::time::sleep(self.inter_date_delay).await;
                }
            }

            info!(
                symbol = %request.symbol,
                created = tally.created,
                skipped = tally.skipped,
                errors = tally.errors,
                "Backfill finished"
            );
            yield tally.complete(false);
        }
    }

    /// Recompute coherence for stored daily snapshots; collaborators are not called
    fn recompute_ncs(self, request: BackfillRequest) -> impl Stream<Item = BackfillEvent> + Send {
        stream! {
            let (from, to) = Self::range_bounds(&request);
            let rows = match snapshots::in_range(
                self.pipeline.db(),
                &request.symbol,
                PeriodType::Daily,
                from,
                to,
            )
            .await
            {
                Ok(rows) => rows,
                Err(e) => {
                    yield BackfillEvent::Error { date: None, message: e.to_string() };
                    yield Tally { errors: 1, ..Default::default() }.complete(request.dry_run);
                    return;
                }
            };

            let total = rows.len();
            yield BackfillEvent::Start {
                action: BackfillAction::RecomputeNcs,
                symbol: request.symbol.clone(),
                start_date: request.start_date,
                end_date: request.end_date,
                total,
                existing: total,
                dry_run: request.dry_run,
            };

            let mut tally = Tally::default();
            if request.dry_run {
                yield tally.complete(true);
                return;
            }

            for (index, mut snapshot) in rows.into_iter().enumerate() {
                let date = snapshot.snapshot_start.date_naive();
                yield BackfillEvent::Progress { date, current: index + 1, total };

                let coherence = signal_metrics::coherence(
                    &snapshot.observed_state.narratives,
                    &snapshot.observed_state.emotions,
                );
                snapshot.observed_state.coherence = coherence;
                match snapshots::upsert_snapshot(self.pipeline.db(), &snapshot).await {
                    Ok(()) => {
                        tally.created += 1;
                        yield BackfillEvent::Created {
                            date,
                            message_count: snapshot.message_count,
                            data_confidence: snapshot.data_confidence,
                            coherence_score: snapshot.observed_state.coherence.score,
                        };
                    }
                    Err(e) => {
                        tally.errors += 1;
                        yield BackfillEvent::Error { date: Some(date), message: e.to_string() };
                    }
                }
            }

            yield tally.complete(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request(start: NaiveDate, end: NaiveDate) -> BackfillRequest {
        BackfillRequest {
            action: BackfillAction::Backfill,
            symbol: " tsla ".to_string(),
            start_date: start,
            end_date: end,
            dry_run: false,
            skip_insufficient_data: true,
        }
    }

    #[test]
    fn test_weekday_dates_skip_weekend() {
        // Fri 2026-03-06 .. Tue 2026-03-10
        let dates = weekday_dates(date(2026, 3, 6), date(2026, 3, 10));
        assert_eq!(dates, vec![date(2026, 3, 6), date(2026, 3, 9), date(2026, 3, 10)]);
        assert!(weekday_dates(date(2026, 3, 7), date(2026, 3, 8)).is_empty());
    }

    #[test]
    fn test_validate_normalizes_symbol() {
        let req = request(date(2026, 1, 1), date(2026, 1, 31)).validate().unwrap();
        assert_eq!(req.symbol, "TSLA");
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        assert!(request(date(2026, 2, 1), date(2026, 1, 1)).validate().is_err());
        // 2024 is a leap year: 366 days is the limit
        assert!(request(date(2024, 1, 1), date(2024, 12, 31)).validate().is_ok());
        assert!(request(date(2024, 1, 1), date(2025, 1, 1)).validate().is_err());
    }

    #[test]
    fn test_request_defaults() {
        let req: BackfillRequest = serde_json::from_str(
            r#"{"symbol":"AAPL","startDate":"2026-01-05","endDate":"2026-01-09"}"#,
        )
        .unwrap();
        assert_eq!(req.action, BackfillAction::Backfill);
        assert!(!req.dry_run);
        assert!(req.skip_insufficient_data);

        let req: BackfillRequest = serde_json::from_str(
            r#"{"action":"recompute_ncs","symbol":"AAPL","startDate":"2026-01-05","endDate":"2026-01-09","dryRun":true}"#,
        )
        .unwrap();
        assert_eq!(req.action, BackfillAction::RecomputeNcs);
        assert!(req.dry_run);
    }

    #[test]
    fn test_event_type_tags() {
        let json = serde_json::to_value(BackfillEvent::Skipped {
            date: date(2026, 3, 9),
            reason: "Insufficient messages".into(),
            message_count: 2,
        })
        .unwrap();
        assert_eq!(json["type"], "skipped");
        assert_eq!(json["date"], "2026-03-09");

        let json = serde_json::to_value(BackfillEvent::Error { date: None, message: "x".into() }).unwrap();
        assert_eq!(json["type"], "error");
        assert!(json.get("date").is_none());
    }
}
