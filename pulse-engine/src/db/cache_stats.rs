//! Hourly cache hit/miss counters

use chrono::{DateTime, Duration, DurationRound, Utc};
use pulse_common::{Error, Result};
use sqlx::SqlitePool;

use super::snapshots::format_timestamp;

/// Start of the hour containing `instant`
pub fn bucket_start(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .duration_trunc(Duration::hours(1))
        .unwrap_or(instant)
}

/// Add counts to the bucket containing `at`
pub async fn record(pool: &SqlitePool, at: DateTime<Utc>, hits: u64, misses: u64) -> Result<()> {
    if hits == 0 && misses == 0 {
        return Ok(());
    }
    let hits = i64::try_from(hits).map_err(|e| Error::InvalidInput(e.to_string()))?;
    let misses = i64::try_from(misses).map_err(|e| Error::InvalidInput(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO cache_stats (bucket_start, hits, misses) VALUES (?, ?, ?)
        ON CONFLICT(bucket_start) DO UPDATE SET
            hits = hits + excluded.hits,
            misses = misses + excluded.misses
        "#,
    )
    .bind(format_timestamp(bucket_start(at)))
    .bind(hits)
    .bind(misses)
    .execute(pool)
    .await?;
    Ok(())
}

/// (hits, misses) summed over buckets starting at or after `since`
pub async fn totals_since(pool: &SqlitePool, since: DateTime<Utc>) -> Result<(u64, u64)> {
    let (hits, misses): (i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(hits), 0), COALESCE(SUM(misses), 0) FROM cache_stats WHERE bucket_start >= ?",
    )
    .bind(format_timestamp(bucket_start(since)))
    .fetch_one(pool)
    .await?;
    Ok((hits.max(0) as u64, misses.max(0) as u64))
}

/// Drop buckets older than `before`; returns rows removed
pub async fn prune_before(pool: &SqlitePool, before: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM cache_stats WHERE bucket_start < ?")
        .bind(format_timestamp(before))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_counts_accumulate_per_hour() {
        let pool = test_pool().await;
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 15, 10, 0).unwrap();
        record(&pool, at, 3, 1).await.unwrap();
        record(&pool, at + Duration::minutes(20), 2, 2).await.unwrap();
        record(&pool, at - Duration::hours(30), 100, 0).await.unwrap();

        let totals = totals_since(&pool, at - Duration::hours(24)).await.unwrap();
        assert_eq!(totals, (5, 3));

        let removed = prune_before(&pool, at - Duration::hours(24)).await.unwrap();
        assert_eq!(removed, 1);
    }

    #[test]
    fn test_bucket_start() {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 15, 59, 59).unwrap();
        assert_eq!(bucket_start(at), Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap());
    }
}
