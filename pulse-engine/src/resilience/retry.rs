//! Bounded retry with a fixed backoff schedule

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// How many times to try and how long to wait between tries
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay after attempt N is `backoff[N-1]`; the last entry repeats
    pub backoff: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Quote proxy: two retries, 1s then 2s
    pub fn proxy() -> Self {
        Self::new(3, vec![Duration::from_secs(1), Duration::from_secs(2)])
    }

    /// Extraction and interpretation collaborators: 1s, 2s, 4s
    pub fn collaborator() -> Self {
        Self::new(
            3,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
        )
    }

    /// Same attempt count, no waiting
    pub fn without_delays(&self) -> Self {
        Self::new(self.max_attempts, Vec::new())
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy's attempts are used up
///
/// `operation` receives the 1-based attempt number.
pub async fn retry_with_policy<F, Fut, T, E, P>(
    operation_name: &str,
    policy: &RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::debug!(operation = operation_name, attempt, error = %err, "Not retryable");
                    return Err(err);
                }
                if attempt >= policy.max_attempts {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Retries exhausted"
                    );
                    return Err(err);
                }

                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, will retry after backoff"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
