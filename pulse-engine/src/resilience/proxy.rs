//! One upstream fetch wrapped in breaker, retry, cache and stale fallback

use chrono::Duration;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::cache::MemoryCache;
use super::circuit_breaker::CircuitBreaker;
use super::error::UpstreamError;
use super::retry::{retry_with_policy, RetryPolicy};

/// Reason tag when the circuit refused the call
pub const REASON_CIRCUIT_OPEN: &str = "circuit_open";
/// Reason tag when retries ran out
pub const REASON_UPSTREAM_ERROR: &str = "upstream_error";

/// Call an upstream under its circuit with bounded retry
///
/// The circuit is consulted before every attempt. Trip-eligible failures are
/// recorded against it; `should_retry` decides whether another attempt is made.
pub async fn guarded_call<F, Fut, T, P>(
    breaker: &CircuitBreaker,
    upstream: &str,
    policy: &RetryPolicy,
    should_retry: P,
    mut call: F,
) -> Result<T, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
    P: Fn(&UpstreamError) -> bool,
{
    retry_with_policy(upstream, policy, should_retry, |_attempt| {
        // The circuit may have opened on the previous attempt
        let pending = breaker.can_make_request(upstream).then(|| call());
        async move {
            let Some(pending) = pending else {
                return Err(UpstreamError::Unavailable(upstream.to_string()));
            };
            match pending.await {
                Ok(payload) => {
                    breaker.record_success(upstream);
                    Ok(payload)
                }
                Err(err) => {
                    if err.is_trip_eligible() {
                        breaker.record_failure(upstream);
                    }
                    Err(err)
                }
            }
        }
    })
    .await
}

/// Payloads that can be served as a marked-degraded stale copy
pub trait Degradable: Clone {
    fn mark_degraded(&self, reason: &str) -> Self;
}

impl Degradable for crate::models::QuoteResponse {
    fn mark_degraded(&self, reason: &str) -> Self {
        self.degraded(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Stale,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Stale => "STALE",
        }
    }
}

/// Failure with no stale copy to fall back on
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyFailure {
    pub status: u16,
    pub message: String,
    /// Seconds until the circuit admits a probe
    pub retry_after_secs: Option<u64>,
}

/// Result plus the traceability metadata every response carries
#[derive(Debug, Clone)]
pub struct ProxyOutcome<T> {
    pub result: Result<T, ProxyFailure>,
    pub cache: CacheStatus,
    pub circuit: &'static str,
    pub request_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct ResilientProxy<T> {
    upstream: String,
    breaker: CircuitBreaker,
    cache: Arc<MemoryCache<T>>,
    policy: RetryPolicy,
}

impl<T: Degradable> ResilientProxy<T> {
    pub fn new(
        upstream: &str,
        breaker: CircuitBreaker,
        cache: Arc<MemoryCache<T>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            upstream: upstream.to_string(),
            breaker,
            cache,
            policy,
        }
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn cache(&self) -> &Arc<MemoryCache<T>> {
        &self.cache
    }

    /// Fetch `key`, calling upstream through `call` only when needed
    pub async fn fetch<F, Fut>(&self, key: &str, ttl: Duration, mut call: F) -> ProxyOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let request_id = Uuid::new_v4();

        if let Some(payload) = self.cache.get_fresh(key, ttl) {
            debug!(key, %request_id, "Cache hit");
            return self.outcome(Ok(payload), CacheStatus::Hit, request_id);
        }

        if !self.breaker.can_make_request(&self.upstream) {
            warn!(upstream = %self.upstream, key, %request_id, "Circuit open, skipping upstream");
            return self.fall_back(
                key,
                REASON_CIRCUIT_OPEN,
                UpstreamError::Unavailable(self.upstream.clone()),
                request_id,
            );
        }

        let result = guarded_call(
            &self.breaker,
            &self.upstream,
            &self.policy,
            UpstreamError::is_trip_eligible,
            &mut call,
        )
        .await;

        match result {
            Ok(payload) => {
                self.cache.insert(key, payload.clone());
                self.outcome(Ok(payload), CacheStatus::Miss, request_id)
            }
            // Caller errors (e.g. unknown symbol) are not masked by stale data
            Err(err @ UpstreamError::Status(_)) if !err.is_trip_eligible() => {
                self.outcome(Err(self.failure(&err)), CacheStatus::Miss, request_id)
            }
            Err(err) => self.fall_back(key, REASON_UPSTREAM_ERROR, err, request_id),
        }
    }

    fn fall_back(
        &self,
        key: &str,
        reason: &str,
        err: UpstreamError,
        request_id: Uuid,
    ) -> ProxyOutcome<T> {
        match self.cache.get_stale(key) {
            Some(stale) => {
                warn!(key, reason, %request_id, error = %err, "Serving stale cache");
                self.outcome(Ok(stale.mark_degraded(reason)), CacheStatus::Stale, request_id)
            }
            None => {
                warn!(key, reason, %request_id, error = %err, "No cached copy to degrade to");
                self.outcome(Err(self.failure(&err)), CacheStatus::Miss, request_id)
            }
        }
    }

    fn failure(&self, err: &UpstreamError) -> ProxyFailure {
        let retry_after_secs = match err {
            UpstreamError::Unavailable(_) => Some(
                self.breaker
                    .cooldown_remaining(&self.upstream)
                    .map(|d| (d.num_milliseconds().max(0) as u64).div_ceil(1000).max(1))
                    .unwrap_or(1),
            ),
            _ => None,
        };
        ProxyFailure {
            status: err.status_code(),
            message: err.to_string(),
            retry_after_secs,
        }
    }

    fn outcome(
        &self,
        result: Result<T, ProxyFailure>,
        cache: CacheStatus,
        request_id: Uuid,
    ) -> ProxyOutcome<T> {
        ProxyOutcome {
            result,
            cache,
            circuit: self.breaker.state_label(&self.upstream),
            request_id,
        }
    }
}
