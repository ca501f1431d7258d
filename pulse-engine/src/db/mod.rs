//! Database access for the engine
//!
//! SQLite through `sqlx`. Tables are created at startup if missing; there is
//! no migration tooling.

pub mod cache_stats;
pub mod settings;
pub mod snapshots;

use pulse_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (creating if needed) the database at `db_path` and ensure tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the engine's tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            symbol TEXT NOT NULL,
            period_type TEXT NOT NULL,
            snapshot_start TEXT NOT NULL,
            snapshot_end TEXT NOT NULL,
            message_count INTEGER NOT NULL DEFAULT 0,
            unique_authors INTEGER NOT NULL DEFAULT 0,
            data_confidence REAL NOT NULL DEFAULT 0.0,
            observed_state TEXT NOT NULL DEFAULT '{}',
            interpretation TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            interpretation_version INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (symbol, period_type, snapshot_start)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_period_start ON snapshots (period_type, snapshot_start)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_stats (
            bucket_start TEXT PRIMARY KEY,
            hits INTEGER NOT NULL DEFAULT 0,
            misses INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (settings, snapshots, cache_stats)");

    Ok(())
}

/// Round-trip check used by the health endpoint
pub async fn ping(pool: &SqlitePool) -> Result<()> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// In-memory database with tables, for tests
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    init_tables(&pool).await.expect("tables");
    pool
}
