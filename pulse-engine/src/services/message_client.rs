//! Social-message provider client, rate limited with `governor`

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::models::message::RawMessage;
use crate::models::snapshot::SnapshotWindow;
use crate::resilience::UpstreamError;

use super::collaborators::{build_http_client, endpoint, read_json, MessageSource};

#[derive(Debug, Deserialize)]
struct MessagePage {
    #[serde(default)]
    messages: Vec<RawMessage>,
}

pub struct HttpMessageSource {
    client: reqwest::Client,
    base_url: Option<String>,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl HttpMessageSource {
    pub fn new(base_url: Option<String>, requests_per_second: u32) -> Result<Self, UpstreamError> {
        let per_second = NonZeroU32::MIN.saturating_add(requests_per_second.saturating_sub(1));
        Ok(Self {
            client: build_http_client(Duration::from_secs(15))?,
            base_url,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }
}

#[async_trait]
impl MessageSource for HttpMessageSource {
    async fn fetch_messages(
        &self,
        symbol: &str,
        window: &SnapshotWindow,
    ) -> Result<Vec<RawMessage>, UpstreamError> {
        let url = endpoint(
            crate::resilience::upstreams::MESSAGES,
            self.base_url.as_deref(),
            "messages",
        )?;

        self.rate_limiter.until_ready().await;

        let start = window.start.to_rfc3339();
        let end = window.end.to_rfc3339();
        tracing::debug!(symbol, start = %start, end = %end, "Fetching messages");

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("start", &start), ("end", &end)])
            .send()
            .await?;
        let page: MessagePage = read_json(response).await?;

        tracing::debug!(symbol, count = page.messages.len(), "Fetched messages");
        Ok(page.messages)
    }
}
