//! Database lock retry
//!
//! SQLite reports "database is locked" when another connection holds the
//! write lock. Those errors are retried with exponential backoff (10ms
//! doubling, capped at 1s per wait) until the configured wait budget is
//! spent. Any other error returns immediately.

use std::future::Future;
use std::time::Duration;

use pulse_common::{Error, Result};

use crate::resilience::retry::{retry_with_policy, RetryPolicy};

/// Default ceiling on total lock wait
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// Backoff schedule whose waits add up to at least `max_wait_ms`
pub fn lock_policy(max_wait_ms: u64) -> RetryPolicy {
    let mut backoff = Vec::new();
    let mut waited = 0u64;
    let mut next = INITIAL_BACKOFF_MS;
    while waited < max_wait_ms {
        backoff.push(Duration::from_millis(next));
        waited += next;
        next = (next * 2).min(MAX_BACKOFF_MS);
    }
    RetryPolicy::new(backoff.len() as u32 + 1, backoff)
}

/// Retry `operation` while it fails with lock contention
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let policy = lock_policy(max_wait_ms);
    retry_with_policy(operation_name, &policy, Error::is_lock_contention, |_| operation())
        .await
        .map_err(|err| {
            if err.is_lock_contention() {
                tracing::error!(
                    operation = operation_name,
                    max_wait_ms,
                    "Database still locked after retry budget"
                );
                Error::Internal(format!(
                    "Database locked after {} attempts (max {} ms)",
                    policy.max_attempts, max_wait_ms
                ))
            } else {
                err
            }
        })
}
