//! Key/value tunables stored in the `settings` table

use pulse_common::Result;
use sqlx::SqlitePool;

use crate::utils::db_retry::DEFAULT_MAX_LOCK_WAIT_MS;

/// Settings key for the database lock wait budget
pub const MAX_LOCK_WAIT_KEY: &str = "database_max_lock_wait_ms";

pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Lock wait budget in ms; unparseable values fall back to the default
pub async fn max_lock_wait_ms(pool: &SqlitePool) -> Result<u64> {
    let value = get_setting(pool, MAX_LOCK_WAIT_KEY).await?;
    Ok(value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_MAX_LOCK_WAIT_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_lock_wait_default_and_override() {
        let pool = test_pool().await;
        assert_eq!(max_lock_wait_ms(&pool).await.unwrap(), DEFAULT_MAX_LOCK_WAIT_MS);

        set_setting(&pool, MAX_LOCK_WAIT_KEY, "250").await.unwrap();
        assert_eq!(max_lock_wait_ms(&pool).await.unwrap(), 250);

        set_setting(&pool, MAX_LOCK_WAIT_KEY, "soon").await.unwrap();
        assert_eq!(max_lock_wait_ms(&pool).await.unwrap(), DEFAULT_MAX_LOCK_WAIT_MS);
    }
}
