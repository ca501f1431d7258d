//! Snapshot persistence
//!
//! One row per (symbol, period_type, snapshot_start). Writes are upserts so
//! repeated runs over the same window are idempotent. Timestamps are stored
//! as second-precision RFC 3339 UTC strings, which sort chronologically.

use chrono::{DateTime, SecondsFormat, Utc};
use pulse_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::interpretation::Interpretation;
use crate::models::observed::ObservedState;
use crate::models::snapshot::{PeriodType, Snapshot};
use crate::utils::retry_on_lock;

use super::settings::max_lock_wait_ms;

const SELECT_COLUMNS: &str = r#"
    SELECT symbol, period_type, snapshot_start, snapshot_end, message_count,
           unique_authors, data_confidence, observed_state, interpretation,
           created_at, interpretation_version
    FROM snapshots
"#;

pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn row_to_snapshot(row: &SqliteRow) -> Result<Snapshot> {
    let period: String = row.get("period_type");
    let period_type = period.parse::<PeriodType>().map_err(Error::Internal)?;

    let snapshot_start: String = row.get("snapshot_start");
    let snapshot_end: String = row.get("snapshot_end");
    let created_at: String = row.get("created_at");
    let observed_state: String = row.get("observed_state");
    let interpretation: String = row.get("interpretation");

    Ok(Snapshot {
        symbol: row.get("symbol"),
        period_type,
        snapshot_start: parse_timestamp("snapshot_start", &snapshot_start)?,
        snapshot_end: parse_timestamp("snapshot_end", &snapshot_end)?,
        message_count: row.get::<i64, _>("message_count").max(0) as u32,
        unique_authors: row.get::<i64, _>("unique_authors").max(0) as u32,
        data_confidence: row.get("data_confidence"),
        observed_state: ObservedState::from_json_lenient(&observed_state),
        interpretation: Interpretation::from_json_lenient(&interpretation),
        created_at: parse_timestamp("created_at", &created_at)?,
        interpretation_version: row.get::<i64, _>("interpretation_version").max(0) as u32,
    })
}

fn rows_to_snapshots(rows: Vec<SqliteRow>) -> Result<Vec<Snapshot>> {
    rows.iter().map(row_to_snapshot).collect()
}

/// Insert or replace the row for the snapshot's natural key
pub async fn upsert_snapshot(pool: &SqlitePool, snapshot: &Snapshot) -> Result<()> {
    let symbol = snapshot.symbol.clone();
    let period_type = snapshot.period_type.as_str();
    let snapshot_start = format_timestamp(snapshot.snapshot_start);
    let snapshot_end = format_timestamp(snapshot.snapshot_end);
    let observed_state = serde_json::to_string(&snapshot.observed_state)?;
    let interpretation = serde_json::to_string(&snapshot.interpretation)?;
    let created_at = format_timestamp(snapshot.created_at);
    let message_count = i64::from(snapshot.message_count);
    let unique_authors = i64::from(snapshot.unique_authors);
    let interpretation_version = i64::from(snapshot.interpretation_version);

    let max_wait_ms = max_lock_wait_ms(pool).await?;

    retry_on_lock("upsert_snapshot", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO snapshots (
                symbol, period_type, snapshot_start, snapshot_end, message_count,
                unique_authors, data_confidence, observed_state, interpretation,
                created_at, interpretation_version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(symbol, period_type, snapshot_start) DO UPDATE SET
                snapshot_end = excluded.snapshot_end,
                message_count = excluded.message_count,
                unique_authors = excluded.unique_authors,
                data_confidence = excluded.data_confidence,
                observed_state = excluded.observed_state,
                interpretation = excluded.interpretation,
                created_at = excluded.created_at,
                interpretation_version = excluded.interpretation_version
            "#,
        )
        .bind(&symbol)
        .bind(period_type)
        .bind(&snapshot_start)
        .bind(&snapshot_end)
        .bind(message_count)
        .bind(unique_authors)
        .bind(snapshot.data_confidence)
        .bind(&observed_state)
        .bind(&interpretation)
        .bind(&created_at)
        .bind(interpretation_version)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

pub async fn load_snapshot(
    pool: &SqlitePool,
    symbol: &str,
    period: PeriodType,
    snapshot_start: DateTime<Utc>,
) -> Result<Option<Snapshot>> {
    let sql = format!(
        "{} WHERE symbol = ? AND period_type = ? AND snapshot_start = ?",
        SELECT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(symbol)
        .bind(period.as_str())
        .bind(format_timestamp(snapshot_start))
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_snapshot).transpose()
}

/// Most recent snapshot starting strictly before `before`
pub async fn latest_before(
    pool: &SqlitePool,
    symbol: &str,
    period: PeriodType,
    before: DateTime<Utc>,
) -> Result<Option<Snapshot>> {
    let sql = format!(
        "{} WHERE symbol = ? AND period_type = ? AND snapshot_start < ? ORDER BY snapshot_start DESC LIMIT 1",
        SELECT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(symbol)
        .bind(period.as_str())
        .bind(format_timestamp(before))
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_snapshot).transpose()
}

pub async fn latest(pool: &SqlitePool, symbol: &str, period: PeriodType) -> Result<Option<Snapshot>> {
    let sql = format!(
        "{} WHERE symbol = ? AND period_type = ? ORDER BY snapshot_start DESC LIMIT 1",
        SELECT_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(symbol)
        .bind(period.as_str())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_snapshot).transpose()
}

/// Daily snapshots starting before `before`, most recent first
pub async fn recent_daily(
    pool: &SqlitePool,
    symbol: &str,
    before: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<Snapshot>> {
    let sql = format!(
        "{} WHERE symbol = ? AND period_type = 'daily' AND snapshot_start < ? ORDER BY snapshot_start DESC LIMIT ?",
        SELECT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(symbol)
        .bind(format_timestamp(before))
        .bind(i64::from(limit))
        .fetch_all(pool)
        .await?;
    rows_to_snapshots(rows)
}

/// Snapshots of `period` whose start lies in `[from, to)`, oldest first
pub async fn in_range(
    pool: &SqlitePool,
    symbol: &str,
    period: PeriodType,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Snapshot>> {
    let sql = format!(
        "{} WHERE symbol = ? AND period_type = ? AND snapshot_start >= ? AND snapshot_start < ? ORDER BY snapshot_start ASC",
        SELECT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(symbol)
        .bind(period.as_str())
        .bind(format_timestamp(from))
        .bind(format_timestamp(to))
        .fetch_all(pool)
        .await?;
    rows_to_snapshots(rows)
}

/// Start instants of existing snapshots in `[from, to)`
pub async fn existing_starts(
    pool: &SqlitePool,
    symbol: &str,
    period: PeriodType,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>> {
    let starts: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT snapshot_start FROM snapshots
        WHERE symbol = ? AND period_type = ? AND snapshot_start >= ? AND snapshot_start < ?
        ORDER BY snapshot_start ASC
        "#,
    )
    .bind(symbol)
    .bind(period.as_str())
    .bind(format_timestamp(from))
    .bind(format_timestamp(to))
    .fetch_all(pool)
    .await?;

    starts
        .iter()
        .map(|raw| parse_timestamp("snapshot_start", raw))
        .collect()
}
