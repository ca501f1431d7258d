//! Resilience layer for outbound dependencies

pub mod cache;
pub mod circuit_breaker;
pub mod error;
pub mod proxy;
pub mod retry;

pub use cache::MemoryCache;
pub use circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitStatus};
pub use error::UpstreamError;
pub use proxy::{guarded_call, CacheStatus, Degradable, ProxyFailure, ProxyOutcome, ResilientProxy};
pub use retry::{retry_with_policy, RetryPolicy};

/// Upstream ids tracked by the breaker
pub mod upstreams {
    pub const QUOTES: &str = "quotes";
    pub const MESSAGES: &str = "messages";
    pub const EXTRACTION: &str = "extraction";
    pub const INTERPRETATION: &str = "interpretation";

    pub const ALL: [&str; 4] = [QUOTES, MESSAGES, EXTRACTION, INTERPRETATION];
}
