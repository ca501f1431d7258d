//! Composite health verdict
//!
//! Combines database reachability, breaker state per upstream, and the
//! 24-hour cache hit rate. The verdict and bucket rules are pure functions
//! so they can be tested without a database.

use chrono::{DateTime, Duration, Utc};
use pulse_common::Clock;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::db::{self, cache_stats};
use crate::models::quote::QuoteResponse;
use crate::resilience::{CircuitBreaker, CircuitStatus, MemoryCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitRateBucket {
    Good,
    Fair,
    Poor,
    NoData,
}

/// Bucket a hit rate; `None` when there were no cache lookups
pub fn hit_rate_bucket(hits: u64, misses: u64) -> (HitRateBucket, Option<f64>) {
    let total = hits + misses;
    if total == 0 {
        return (HitRateBucket::NoData, None);
    }
    let rate = hits as f64 / total as f64;
    let bucket = if rate >= 0.7 {
        HitRateBucket::Good
    } else if rate >= 0.4 {
        HitRateBucket::Fair
    } else {
        HitRateBucket::Poor
    };
    (bucket, Some(rate))
}

/// Overall status from the individual checks
pub fn verdict(
    database_ok: bool,
    circuits: impl IntoIterator<Item = CircuitStatus>,
    hit_rate: HitRateBucket,
) -> HealthStatus {
    let circuits: Vec<CircuitStatus> = circuits.into_iter().collect();
    if !database_ok || circuits.contains(&CircuitStatus::Open) {
        HealthStatus::Unhealthy
    } else if circuits.contains(&CircuitStatus::HalfOpen) || hit_rate == HitRateBucket::Poor {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseCheck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheHitRateCheck {
    pub bucket: HitRateBucket,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    pub database: DatabaseCheck,
    pub upstream_circuits: BTreeMap<String, String>,
    pub cache_hit_rate: CacheHitRateCheck,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: HealthChecks,
    pub version: String,
    pub uptime_ms: u64,
}

impl HealthReport {
    /// 503 only when unhealthy
    pub fn http_status(&self) -> axum::http::StatusCode {
        match self.status {
            HealthStatus::Unhealthy => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            _ => axum::http::StatusCode::OK,
        }
    }
}

#[derive(Clone)]
pub struct HealthAggregator {
    db: SqlitePool,
    breaker: CircuitBreaker,
    quote_cache: Arc<MemoryCache<QuoteResponse>>,
    upstream_ids: Vec<String>,
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
}

impl HealthAggregator {
    pub fn new(
        db: SqlitePool,
        breaker: CircuitBreaker,
        quote_cache: Arc<MemoryCache<QuoteResponse>>,
        upstream_ids: Vec<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let started_at = clock.now();
        Self {
            db,
            breaker,
            quote_cache,
            upstream_ids,
            clock,
            started_at,
        }
    }

    pub async fn check(&self) -> HealthReport {
        let now = self.clock.now();

        let started = Instant::now();
        let database = match db::ping(&self.db).await {
            Ok(()) => DatabaseCheck {
                ok: true,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "Health check: database unreachable");
                DatabaseCheck {
                    ok: false,
                    latency_ms: None,
                    error: Some(e.to_string()),
                }
            }
        };

        // Persisted buckets plus whatever has not been flushed yet
        let (pending_hits, pending_misses) = self.quote_cache.pending_counters();
        let (stored_hits, stored_misses) = if database.ok {
            cache_stats::totals_since(&self.db, now - Duration::hours(24))
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Health check: cache stats unavailable");
                    (0, 0)
                })
        } else {
            (0, 0)
        };
        let hits = stored_hits + pending_hits;
        let misses = stored_misses + pending_misses;
        let (bucket, rate) = hit_rate_bucket(hits, misses);

        let extra: Vec<&str> = self.upstream_ids.iter().map(String::as_str).collect();
        let upstream_circuits = self.breaker.labels(&extra);
        let statuses: Vec<CircuitStatus> = self
            .breaker
            .tracked_ids()
            .iter()
            .map(|id| self.breaker.status(id))
            .collect();

        let status = verdict(database.ok, statuses, bucket);

        HealthReport {
            status,
            timestamp: now,
            checks: HealthChecks {
                database,
                upstream_circuits,
                cache_hit_rate: CacheHitRateCheck {
                    bucket,
                    rate: rate.map(|r| (r * 1000.0).round() / 1000.0),
                    hits,
                    misses,
                },
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_ms: (now - self.started_at).num_milliseconds().max(0) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_CIRCUITS: [CircuitStatus; 0] = [];

    #[test]
    fn test_hit_rate_buckets() {
        assert_eq!(hit_rate_bucket(0, 0), (HitRateBucket::NoData, None));
        assert_eq!(hit_rate_bucket(7, 3).0, HitRateBucket::Good);
        assert_eq!(hit_rate_bucket(4, 6).0, HitRateBucket::Fair);
        assert_eq!(hit_rate_bucket(39, 61).0, HitRateBucket::Poor);
    }

    #[test]
    fn test_open_circuit_is_unhealthy() {
        let status = verdict(
            true,
            [CircuitStatus::Closed, CircuitStatus::Open],
            HitRateBucket::Good,
        );
        assert_eq!(status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_database_failure_is_unhealthy() {
        assert_eq!(verdict(false, NO_CIRCUITS, HitRateBucket::NoData), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_half_open_or_poor_cache_is_degraded() {
        assert_eq!(
            verdict(true, [CircuitStatus::HalfOpen], HitRateBucket::Good),
            HealthStatus::Degraded
        );
        assert_eq!(verdict(true, NO_CIRCUITS, HitRateBucket::Poor), HealthStatus::Degraded);
    }

    #[test]
    fn test_no_data_is_healthy() {
        assert_eq!(
            verdict(true, [CircuitStatus::Closed], HitRateBucket::NoData),
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_check_reports_open_upstream() {
        use chrono::TimeZone;
        use pulse_common::ManualClock;

        let pool = crate::db::test_pool().await;
        let clock: Arc<dyn Clock> =
            Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 4, 15, 0, 0).unwrap()));
        let breaker = CircuitBreaker::new(Default::default(), clock.clone());
        for _ in 0..5 {
            breaker.record_failure("quotes");
        }
        let cache = Arc::new(MemoryCache::new(clock.clone()));
        let health = HealthAggregator::new(
            pool,
            breaker,
            cache,
            vec!["quotes".to_string(), "messages".to_string()],
            clock,
        );

        let report = health.check().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.http_status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.checks.upstream_circuits["quotes"], "OPEN");
        assert_eq!(report.checks.upstream_circuits["messages"], "CLOSED");
        assert!(report.checks.database.ok);
        assert_eq!(report.checks.cache_hit_rate.bucket, HitRateBucket::NoData);
    }
}
