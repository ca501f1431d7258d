//! Upstream call failures

use thiserror::Error;

use super::circuit_breaker::is_trip_eligible;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum UpstreamError {
    /// Circuit open; the call was never attempted
    #[error("Upstream {0} unavailable (circuit open)")]
    Unavailable(String),

    #[error("Rate limited by upstream")]
    RateLimited,

    #[error("Upstream returned HTTP {0}")]
    Status(u16),

    #[error("Malformed upstream response: {0}")]
    Malformed(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl UpstreamError {
    pub fn from_status(status: u16) -> Self {
        if status == 429 {
            UpstreamError::RateLimited
        } else {
            UpstreamError::Status(status)
        }
    }

    /// Whether this failure counts against the upstream's circuit
    pub fn is_trip_eligible(&self) -> bool {
        match self {
            UpstreamError::Unavailable(_) => false,
            UpstreamError::RateLimited => true,
            UpstreamError::Status(status) => is_trip_eligible(*status, true),
            UpstreamError::Malformed(_) | UpstreamError::Transport(_) => true,
        }
    }

    /// Whether a collaborator call is worth repeating (429, 5xx, transport)
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::RateLimited | UpstreamError::Transport(_) => true,
            UpstreamError::Status(status) => *status >= 500,
            UpstreamError::Unavailable(_) | UpstreamError::Malformed(_) => false,
        }
    }

    /// HTTP status to surface when no fallback is available
    pub fn status_code(&self) -> u16 {
        match self {
            UpstreamError::Unavailable(_) => 503,
            UpstreamError::RateLimited => 429,
            UpstreamError::Status(status) => *status,
            UpstreamError::Malformed(_) | UpstreamError::Transport(_) => 502,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            UpstreamError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            UpstreamError::from_status(status.as_u16())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(UpstreamError::RateLimited.is_retryable());
        assert!(UpstreamError::Status(503).is_retryable());
        assert!(UpstreamError::Status(500).is_trip_eligible());
        assert!(!UpstreamError::Status(404).is_retryable());
        assert!(!UpstreamError::Status(404).is_trip_eligible());
        assert!(UpstreamError::Malformed("x".into()).is_trip_eligible());
        assert!(!UpstreamError::Malformed("x".into()).is_retryable());
        assert!(!UpstreamError::Unavailable("quotes".into()).is_trip_eligible());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(UpstreamError::from_status(429), UpstreamError::RateLimited);
        assert_eq!(UpstreamError::from_status(502).status_code(), 502);
        assert_eq!(UpstreamError::Transport("reset".into()).status_code(), 502);
    }
}
