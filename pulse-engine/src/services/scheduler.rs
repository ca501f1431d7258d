//! In-process run scheduler
//!
//! Ticks once a minute. Each tick flushes the quote cache counters to
//! `cache_stats` and starts an orchestrator run for every period whose
//! latest complete window has moved since the last run. Runs are awaited
//! in turn, never overlapped.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pulse_common::Clock;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::db::cache_stats;
use crate::models::quote::QuoteResponse;
use crate::models::snapshot::PeriodType;
use crate::resilience::MemoryCache;

use super::snapshot_orchestrator::SnapshotOrchestrator;

pub const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Hourly buckets older than this are pruned
const CACHE_STATS_RETENTION_DAYS: i64 = 7;

/// Periods whose latest complete window differs from the one last seen
///
/// `last_seen` is updated for every period returned.
pub fn due_periods(
    last_seen: &mut HashMap<PeriodType, DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Vec<PeriodType> {
    let mut due = Vec::new();
    for period in PeriodType::ALL {
        let start = period.latest_complete_window(now).start;
        if last_seen.get(&period) != Some(&start) {
            last_seen.insert(period, start);
            due.push(period);
        }
    }
    due
}

/// Move in-process cache counters into the hourly table
pub async fn flush_cache_stats(
    pool: &SqlitePool,
    cache: &MemoryCache<QuoteResponse>,
    now: DateTime<Utc>,
) -> pulse_common::Result<()> {
    let (hits, misses) = cache.take_counters();
    cache_stats::record(pool, now, hits, misses).await?;
    let pruned =
        cache_stats::prune_before(pool, now - ChronoDuration::days(CACHE_STATS_RETENTION_DAYS)).await?;
    if pruned > 0 {
        debug!(pruned, "Pruned old cache stats buckets");
    }
    Ok(())
}

pub struct Scheduler {
    orchestrator: SnapshotOrchestrator,
    db: SqlitePool,
    quote_cache: Arc<MemoryCache<QuoteResponse>>,
    clock: Arc<dyn Clock>,
    last_seen: HashMap<PeriodType, DateTime<Utc>>,
}

impl Scheduler {
    /// Seeded with the current windows so a restart does not rerun them
    pub fn new(
        orchestrator: SnapshotOrchestrator,
        db: SqlitePool,
        quote_cache: Arc<MemoryCache<QuoteResponse>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut last_seen = HashMap::new();
        due_periods(&mut last_seen, clock.now());
        Self {
            orchestrator,
            db,
            quote_cache,
            clock,
            last_seen,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run_loop())
    }

    async fn run_loop(mut self) {
        info!(tick_secs = TICK_INTERVAL.as_secs(), "Scheduler started");
        let mut tick = interval(TICK_INTERVAL);
        loop {
            tick.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&mut self) {
        let now = self.clock.now();
        if let Err(e) = flush_cache_stats(&self.db, &self.quote_cache, now).await {
            warn!(error = %e, "Failed to flush cache stats");
        }

        for period in due_periods(&mut self.last_seen, now) {
            info!(period = %period, "Scheduled run due");
            let report = self.orchestrator.run(period, false).await;
            debug!(period = %period, results = report.results.len(), "Scheduled run complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_due_periods_fire_once_per_window() {
        let mut seen = HashMap::new();
        let t0 = Utc.with_ymd_and_hms(2026, 3, 4, 15, 10, 0).unwrap();
        assert_eq!(due_periods(&mut seen, t0).len(), 4);
        assert!(due_periods(&mut seen, t0 + ChronoDuration::minutes(30)).is_empty());

        // Next hour: only hourly moves
        let t1 = Utc.with_ymd_and_hms(2026, 3, 4, 16, 0, 0).unwrap();
        assert_eq!(due_periods(&mut seen, t1), vec![PeriodType::Hourly]);

        // Next day: hourly and daily
        let t2 = Utc.with_ymd_and_hms(2026, 3, 5, 0, 1, 0).unwrap();
        assert_eq!(due_periods(&mut seen, t2), vec![PeriodType::Hourly, PeriodType::Daily]);
    }

    #[tokio::test]
    async fn test_flush_moves_counters() {
        use pulse_common::ManualClock;

        let now = Utc.with_ymd_and_hms(2026, 3, 4, 15, 10, 0).unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(now));
        let pool = crate::db::test_pool().await;
        let cache: MemoryCache<QuoteResponse> = MemoryCache::new(clock);
        cache.insert("AAPL:1d", QuoteResponse::default());
        assert!(cache.get_fresh("AAPL:1d", ChronoDuration::seconds(60)).is_some());
        assert!(cache.get_fresh("TSLA:1d", ChronoDuration::seconds(60)).is_none());

        flush_cache_stats(&pool, &cache, now).await.unwrap();
        assert_eq!(cache.pending_counters(), (0, 0));
        let totals = cache_stats::totals_since(&pool, now - ChronoDuration::hours(24))
            .await
            .unwrap();
        assert_eq!(totals, (1, 1));
    }
}
