//! Market quote payload served by the quote proxy

use serde::{Deserialize, Serialize};

/// One OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Unix milliseconds
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: u64,
}

/// Normalized quote response
///
/// `_degraded`/`_reason` only appear when the body came from stale cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub prices: Vec<PricePoint>,
    pub current_price: f64,
    pub previous_close: f64,
    pub change: f64,
    pub change_percent: f64,
    #[serde(default)]
    pub market_state: String,
    #[serde(rename = "_degraded", default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<bool>,
    #[serde(rename = "_reason", default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl QuoteResponse {
    /// Copy of this payload marked as served from stale cache
    pub fn degraded(&self, reason: &str) -> Self {
        Self {
            degraded: Some(true),
            reason: Some(reason.to_string()),
            ..self.clone()
        }
    }
}

/// Accepted `timeRange` values and the bar interval requested upstream for each
pub const TIME_RANGES: [(&str, &str); 7] = [
    ("1d", "5m"),
    ("5d", "15m"),
    ("1mo", "1d"),
    ("3mo", "1d"),
    ("6mo", "1d"),
    ("1y", "1wk"),
    ("5y", "1mo"),
];

/// Bar interval for `range`, if it is an accepted range
pub fn interval_for_range(range: &str) -> Option<&'static str> {
    TIME_RANGES
        .iter()
        .find(|(r, _)| *r == range)
        .map(|(_, interval)| *interval)
}

/// Intraday ranges refresh faster than historical ones
pub fn is_intraday_range(range: &str) -> bool {
    matches!(range, "1d" | "5d")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QuoteResponse {
        QuoteResponse {
            prices: vec![PricePoint {
                timestamp: 1_772_600_000_000,
                open: 10.0,
                high: 11.0,
                low: 9.5,
                close: 10.5,
                volume: 1200,
            }],
            current_price: 10.5,
            previous_close: 10.0,
            change: 0.5,
            change_percent: 5.0,
            market_state: "REGULAR".to_string(),
            degraded: None,
            reason: None,
        }
    }

    #[test]
    fn test_fresh_payload_omits_degraded_markers() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("_degraded").is_none());
        assert_eq!(json["currentPrice"], 10.5);
        assert_eq!(json["changePercent"], 5.0);
    }

    #[test]
    fn test_degraded_copy_carries_reason() {
        let json = serde_json::to_value(sample().degraded("circuit_open")).unwrap();
        assert_eq!(json["_degraded"], true);
        assert_eq!(json["_reason"], "circuit_open");
    }

    #[test]
    fn test_ranges() {
        assert_eq!(interval_for_range("1d"), Some("5m"));
        assert_eq!(interval_for_range("10y"), None);
        assert!(is_intraday_range("5d"));
        assert!(!is_intraday_range("1mo"));
    }
}
