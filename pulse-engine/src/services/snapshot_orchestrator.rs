//! Scheduled snapshot runs across the watchlist
//!
//! One run handles one period type for every watched symbol, strictly in
//! order, with a pause between symbols. A symbol's failure is reported and
//! the run moves on. Before each symbol the elapsed time is checked against
//! the run budget; symbols left when the budget is spent are reported as
//! `not_started`.

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::snapshot::{PeriodType, SnapshotWindow};

use super::pipeline::{SnapshotPipeline, UnitOutcome};

/// UTC trading window, Monday to Friday
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl Default for TradingHours {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(13, 30, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl TradingHours {
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let time = now.time();
        time >= self.open && time < self.close
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub watchlist: Vec<String>,
    pub trading_hours: TradingHours,
    pub run_budget: Duration,
    pub inter_symbol_delay: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            watchlist: Vec::new(),
            trading_hours: TradingHours::default(),
            run_budget: Duration::from_secs(140),
            inter_symbol_delay: Duration::from_millis(2000),
        }
    }
}

/// Result for one watchlist symbol
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SymbolOutcome {
    Created {
        symbol: String,
        snapshot_start: DateTime<Utc>,
        message_count: u32,
        data_confidence: f64,
    },
    Skipped {
        symbol: String,
        reason: String,
        message_count: u32,
    },
    Failed {
        symbol: String,
        error: String,
    },
    NotStarted {
        symbol: String,
    },
}

impl SymbolOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            SymbolOutcome::Created { symbol, .. }
            | SymbolOutcome::Skipped { symbol, .. }
            | SymbolOutcome::Failed { symbol, .. }
            | SymbolOutcome::NotStarted { symbol } => symbol,
        }
    }
}

/// Summary of one orchestrator run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub period: PeriodType,
    /// Set when the run did nothing (outside trading hours)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<SnapshotWindow>,
    pub results: Vec<SymbolOutcome>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn count(&self, status: &str) -> usize {
        self.results
            .iter()
            .filter(|r| match r {
                SymbolOutcome::Created { .. } => status == "created",
                SymbolOutcome::Skipped { .. } => status == "skipped",
                SymbolOutcome::Failed { .. } => status == "failed",
                SymbolOutcome::NotStarted { .. } => status == "not_started",
            })
            .count()
    }
}

#[derive(Clone)]
pub struct SnapshotOrchestrator {
    pipeline: SnapshotPipeline,
    settings: OrchestratorSettings,
}

impl SnapshotOrchestrator {
    pub fn new(pipeline: SnapshotPipeline, settings: OrchestratorSettings) -> Self {
        Self { pipeline, settings }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Run one period for the whole watchlist
    ///
    /// Hourly runs outside trading hours return an empty report unless
    /// `force` is set.
    pub async fn run(&self, period: PeriodType, force: bool) -> RunReport {
        let clock = self.pipeline.clock().clone();
        let started = clock.now();

        if period == PeriodType::Hourly && !force && !self.settings.trading_hours.is_open(started) {
            info!(period = %period, "Outside trading hours, skipping run");
            return RunReport {
                period,
                skipped_reason: Some("Outside trading hours".to_string()),
                window: None,
                results: Vec::new(),
                elapsed_ms: 0,
            };
        }

        let window = period.latest_complete_window(started);
        let budget = chrono::Duration::from_std(self.settings.run_budget)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        info!(
            period = %period,
            start = %window.start,
            end = %window.end,
            symbols = self.settings.watchlist.len(),
            "Snapshot run started"
        );

        let mut results = Vec::with_capacity(self.settings.watchlist.len());
        let total = self.settings.watchlist.len();
        for (index, symbol) in self.settings.watchlist.iter().enumerate() {
            let elapsed = clock.now() - started;
            if elapsed > budget {
                warn!(
                    symbol = %symbol,
                    elapsed_ms = elapsed.num_milliseconds(),
                    "Run budget exhausted; not starting symbol"
                );
                results.push(SymbolOutcome::NotStarted { symbol: symbol.clone() });
                continue;
            }

            let outcome = self.pipeline.process(symbol, period, window, clock.now()).await;
            results.push(match outcome {
                UnitOutcome::Created(snapshot) => SymbolOutcome::Created {
                    symbol: symbol.clone(),
                    snapshot_start: snapshot.snapshot_start,
                    message_count: snapshot.message_count,
                    data_confidence: snapshot.data_confidence,
                },
                UnitOutcome::Skipped { reason, message_count } => SymbolOutcome::Skipped {
                    symbol: symbol.clone(),
                    reason,
                    message_count,
                },
                UnitOutcome::Failed { error } => SymbolOutcome::Failed {
                    symbol: symbol.clone(),
                    error,
                },
            });

            if index + 1 < total && !self.settings.inter_symbol_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_symbol_delay).await;
            }
        }

        let elapsed_ms = (clock.now() - started).num_milliseconds().max(0) as u64;
        let report = RunReport {
            period,
            skipped_reason: None,
            window: Some(window),
            results,
            elapsed_ms,
        };
        info!(
            period = %period,
            created = report.count("created"),
            skipped = report.count("skipped"),
            failed = report.count("failed"),
            not_started = report.count("not_started"),
            elapsed_ms,
            "Snapshot run finished"
        );
        report
    }
}
