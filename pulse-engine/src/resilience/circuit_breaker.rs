//! Per-upstream circuit breaker
//!
//! Closed: requests flow and consecutive failures are counted; a success
//! resets the count. Open: requests are refused until the reset timeout has
//! passed since the last failure. Half-open: probes are allowed; enough
//! consecutive successes close the circuit, a single failure reopens it.
//!
//! State is process-local and starts empty on every restart.

use chrono::{DateTime, Duration, Utc};
use pulse_common::Clock;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CircuitStatus::Closed => "CLOSED",
            CircuitStatus::Open => "OPEN",
            CircuitStatus::HalfOpen => "HALF-OPEN",
        }
    }
}

/// Tracked state for one upstream id
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitState {
    pub failures: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub status: CircuitStatus,
    pub half_open_successes: u32,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            failures: 0,
            last_failure: None,
            last_success: None,
            status: CircuitStatus::Closed,
            half_open_successes: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that open a closed circuit
    pub failure_threshold: u32,
    /// Cooldown after the last failure before a probe is allowed
    pub reset_timeout: Duration,
    /// Consecutive half-open successes that close the circuit
    pub half_open_success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::seconds(30),
            half_open_success_threshold: 2,
        }
    }
}

/// Shared table of circuit states keyed by upstream id
pub type CircuitStore = Arc<Mutex<HashMap<String, CircuitState>>>;

/// Whether an upstream response counts against the circuit
///
/// Rate limiting, server errors and unparseable bodies mean the upstream is
/// unhealthy. Other 4xx statuses are the caller's fault.
pub fn is_trip_eligible(status: u16, body_parses: bool) -> bool {
    match status {
        429 => true,
        s if s >= 500 => true,
        s if (400..500).contains(&s) => false,
        _ => !body_parses,
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    store: CircuitStore,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_store(config, clock, CircuitStore::default())
    }

    pub fn with_store(config: BreakerConfig, clock: Arc<dyn Clock>, store: CircuitStore) -> Self {
        Self { config, clock, store }
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, CircuitState>> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cooldown_elapsed(&self, state: &CircuitState, now: DateTime<Utc>) -> bool {
        match state.last_failure {
            Some(at) => now - at >= self.config.reset_timeout,
            None => true,
        }
    }

    /// True when a call to `id` may proceed
    ///
    /// An open circuit whose cooldown has passed moves to half-open here.
    pub fn can_make_request(&self, id: &str) -> bool {
        let now = self.clock.now();
        let mut table = self.table();
        let Some(state) = table.get_mut(id) else {
            return true;
        };

        match state.status {
            CircuitStatus::Closed | CircuitStatus::HalfOpen => true,
            CircuitStatus::Open => {
                if self.cooldown_elapsed(state, now) {
                    state.status = CircuitStatus::HalfOpen;
                    state.half_open_successes = 0;
                    info!(upstream = id, "Circuit half-open, allowing probe");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self, id: &str) {
        let now = self.clock.now();
        let mut table = self.table();
        let Some(state) = table.get_mut(id) else {
            return;
        };

        state.last_success = Some(now);
        match state.status {
            CircuitStatus::Closed => state.failures = 0,
            CircuitStatus::HalfOpen => {
                state.half_open_successes += 1;
                if state.half_open_successes >= self.config.half_open_success_threshold {
                    state.status = CircuitStatus::Closed;
                    state.failures = 0;
                    state.half_open_successes = 0;
                    info!(upstream = id, "Circuit closed");
                }
            }
            CircuitStatus::Open => {}
        }
    }

    pub fn record_failure(&self, id: &str) {
        let now = self.clock.now();
        let mut table = self.table();
        let state = table.entry(id.to_string()).or_default();

        state.failures += 1;
        state.last_failure = Some(now);
        match state.status {
            CircuitStatus::Closed => {
                if state.failures >= self.config.failure_threshold {
                    state.status = CircuitStatus::Open;
                    warn!(upstream = id, failures = state.failures, "Circuit opened");
                }
            }
            CircuitStatus::HalfOpen => {
                state.status = CircuitStatus::Open;
                state.half_open_successes = 0;
                warn!(upstream = id, "Probe failed, circuit reopened");
            }
            CircuitStatus::Open => {}
        }
    }

    /// Observable status; an open circuit past its cooldown reads as half-open
    pub fn status(&self, id: &str) -> CircuitStatus {
        let now = self.clock.now();
        let table = self.table();
        match table.get(id) {
            None => CircuitStatus::Closed,
            Some(state) if state.status == CircuitStatus::Open && self.cooldown_elapsed(state, now) => {
                CircuitStatus::HalfOpen
            }
            Some(state) => state.status,
        }
    }

    /// `CLOSED`, `OPEN` or `HALF-OPEN`
    pub fn state_label(&self, id: &str) -> &'static str {
        self.status(id).label()
    }

    /// Time left before an open circuit admits a probe
    pub fn cooldown_remaining(&self, id: &str) -> Option<Duration> {
        let now = self.clock.now();
        let table = self.table();
        let state = table.get(id)?;
        if state.status != CircuitStatus::Open {
            return None;
        }
        let remaining = self.config.reset_timeout - (now - state.last_failure?);
        (remaining > Duration::zero()).then_some(remaining)
    }

    pub fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.table().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Label per tracked id, plus `extra_ids` reported as closed when untracked
    pub fn labels(&self, extra_ids: &[&str]) -> BTreeMap<String, String> {
        let mut labels: BTreeMap<String, String> = self
            .tracked_ids()
            .into_iter()
            .map(|id| {
                let label = self.state_label(&id).to_string();
                (id, label)
            })
            .collect();
        for id in extra_ids {
            labels
                .entry((*id).to_string())
                .or_insert_with(|| CircuitStatus::Closed.label().to_string());
        }
        labels
    }

    /// Copy of the stored state for `id`
    pub fn state(&self, id: &str) -> Option<CircuitState> {
        self.table().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pulse_common::ManualClock;

    fn breaker() -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap(),
        ));
        (CircuitBreaker::new(BreakerConfig::default(), clock.clone()), clock)
    }

    #[test]
    fn test_unknown_id_is_closed() {
        let (breaker, _) = breaker();
        assert!(breaker.can_make_request("quotes"));
        assert_eq!(breaker.state_label("quotes"), "CLOSED");
        breaker.record_success("quotes");
        assert!(breaker.tracked_ids().is_empty());
    }

    #[test]
    fn test_five_failures_open_the_circuit() {
        let (breaker, _) = breaker();
        for _ in 0..4 {
            breaker.record_failure("quotes");
            assert!(breaker.can_make_request("quotes"));
        }
        breaker.record_failure("quotes");
        assert!(!breaker.can_make_request("quotes"));
        assert_eq!(breaker.state_label("quotes"), "OPEN");
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let (breaker, _) = breaker();
        for _ in 0..4 {
            breaker.record_failure("quotes");
        }
        breaker.record_success("quotes");
        for _ in 0..4 {
            breaker.record_failure("quotes");
        }
        assert!(breaker.can_make_request("quotes"));
        assert_eq!(breaker.state("quotes").unwrap().failures, 4);
    }

    #[test]
    fn test_cooldown_then_two_successes_close() {
        let (breaker, clock) = breaker();
        for _ in 0..5 {
            breaker.record_failure("quotes");
        }
        clock.advance(Duration::seconds(29));
        assert!(!breaker.can_make_request("quotes"));

        clock.advance(Duration::seconds(1));
        assert_eq!(breaker.state_label("quotes"), "HALF-OPEN");
        assert!(breaker.can_make_request("quotes"));
        assert_eq!(breaker.state_label("quotes"), "HALF-OPEN");

        breaker.record_success("quotes");
        assert_eq!(breaker.state_label("quotes"), "HALF-OPEN");
        breaker.record_success("quotes");
        assert_eq!(breaker.state_label("quotes"), "CLOSED");
        assert_eq!(breaker.state("quotes").unwrap().failures, 0);
    }

    #[test]
    fn test_half_open_failure_reopens_immediately() {
        let (breaker, clock) = breaker();
        for _ in 0..5 {
            breaker.record_failure("quotes");
        }
        clock.advance(Duration::seconds(30));
        assert!(breaker.can_make_request("quotes"));
        breaker.record_success("quotes");
        breaker.record_failure("quotes");

        assert_eq!(breaker.state_label("quotes"), "OPEN");
        assert!(!breaker.can_make_request("quotes"));
        assert_eq!(breaker.cooldown_remaining("quotes"), Some(Duration::seconds(30)));
    }

    #[test]
    fn test_circuits_are_independent() {
        let (breaker, _) = breaker();
        for _ in 0..5 {
            breaker.record_failure("extraction");
        }
        assert!(breaker.can_make_request("quotes"));
        let labels = breaker.labels(&["quotes"]);
        assert_eq!(labels["extraction"], "OPEN");
        assert_eq!(labels["quotes"], "CLOSED");
    }

    #[test]
    fn test_trip_eligibility() {
        assert!(is_trip_eligible(429, true));
        assert!(is_trip_eligible(500, true));
        assert!(is_trip_eligible(503, true));
        assert!(!is_trip_eligible(404, false));
        assert!(!is_trip_eligible(400, true));
        assert!(is_trip_eligible(200, false));
        assert!(!is_trip_eligible(200, true));
    }
}
