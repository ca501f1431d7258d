//! Market-quote provider client
//!
//! The provider returns raw chart bars plus market metadata; this client
//! normalizes them into a [`QuoteResponse`].

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::models::quote::{PricePoint, QuoteResponse};
use crate::resilience::UpstreamError;

use super::collaborators::{build_http_client, endpoint, read_json, QuoteProvider};
use super::signal_metrics::round_to;

/// Provider chart payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPayload {
    #[serde(default)]
    pub bars: Vec<PricePoint>,
    pub regular_market_price: Option<f64>,
    pub previous_close: Option<f64>,
    pub market_state: Option<String>,
}

impl ChartPayload {
    /// Normalize; a chart with neither bars nor a price is malformed
    pub fn into_quote(self) -> Result<QuoteResponse, UpstreamError> {
        let current_price = self
            .regular_market_price
            .or_else(|| self.bars.last().map(|b| b.close))
            .ok_or_else(|| UpstreamError::Malformed("chart has no price data".to_string()))?;
        let previous_close = self
            .previous_close
            .or_else(|| self.bars.first().map(|b| b.open))
            .unwrap_or(current_price);

        let change = current_price - previous_close;
        let change_percent = if previous_close != 0.0 {
            change / previous_close * 100.0
        } else {
            0.0
        };

        Ok(QuoteResponse {
            prices: self.bars,
            current_price,
            previous_close,
            change: round_to(change, 4),
            change_percent: round_to(change_percent, 2),
            market_state: self.market_state.unwrap_or_else(|| "UNKNOWN".to_string()),
            degraded: None,
            reason: None,
        })
    }
}

pub struct HttpQuoteProvider {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpQuoteProvider {
    pub fn new(base_url: Option<String>) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: build_http_client(Duration::from_secs(10))?,
            base_url,
        })
    }
}

#[async_trait]
impl QuoteProvider for HttpQuoteProvider {
    async fn fetch_quote(
        &self,
        symbol: &str,
        range: &str,
        interval: &str,
    ) -> Result<QuoteResponse, UpstreamError> {
        let url = endpoint(
            crate::resilience::upstreams::QUOTES,
            self.base_url.as_deref(),
            &format!("chart/{}", symbol),
        )?;
        tracing::debug!(symbol, range, interval, "Fetching quote");

        let response = self
            .client
            .get(&url)
            .query(&[("range", range), ("interval", interval)])
            .send()
            .await?;
        let chart: ChartPayload = read_json(response).await?;
        chart.into_quote()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, close: f64) -> PricePoint {
        PricePoint {
            timestamp: 0,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 10,
        }
    }

    #[test]
    fn test_normalize_from_metadata() {
        let chart = ChartPayload {
            bars: vec![bar(100.0, 101.0)],
            regular_market_price: Some(102.0),
            previous_close: Some(100.0),
            market_state: Some("REGULAR".to_string()),
        };
        let quote = chart.into_quote().unwrap();
        assert_eq!(quote.change, 2.0);
        assert_eq!(quote.change_percent, 2.0);
        assert_eq!(quote.market_state, "REGULAR");
    }

    #[test]
    fn test_normalize_from_bars_only() {
        let chart: ChartPayload =
            serde_json::from_str(r#"{"bars":[{"timestamp":1,"open":50,"high":55,"low":49,"close":55}]}"#)
                .unwrap();
        let quote = chart.into_quote().unwrap();
        assert_eq!(quote.current_price, 55.0);
        assert_eq!(quote.previous_close, 50.0);
        assert_eq!(quote.change_percent, 10.0);
        assert_eq!(quote.market_state, "UNKNOWN");
    }

    #[test]
    fn test_empty_chart_is_malformed() {
        let chart: ChartPayload = serde_json::from_str("{}").unwrap();
        assert!(matches!(chart.into_quote(), Err(UpstreamError::Malformed(_))));
    }
}
