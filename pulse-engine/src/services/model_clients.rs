//! Extraction and interpretation service clients
//!
//! Both are JSON-over-POST services; model latency makes their timeouts
//! longer than the market-data clients'.

use async_trait::async_trait;
use std::time::Duration;

use crate::resilience::upstreams;
use crate::resilience::UpstreamError;

use super::collaborators::{
    build_http_client, endpoint, read_json, ExtractionRequest, ExtractionResult,
    ExtractionService, InterpretationRequest, InterpretationResult, InterpretationService,
};

const MODEL_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HttpExtractionService {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpExtractionService {
    pub fn new(base_url: Option<String>) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: build_http_client(MODEL_TIMEOUT)?,
            base_url,
        })
    }
}

#[async_trait]
impl ExtractionService for HttpExtractionService {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult, UpstreamError> {
        let url = endpoint(upstreams::EXTRACTION, self.base_url.as_deref(), "extract")?;
        tracing::debug!(
            symbol = %request.symbol,
            messages = request.messages.len(),
            "Calling extraction service"
        );
        let response = self.client.post(&url).json(request).send().await?;
        read_json(response).await
    }
}

pub struct HttpInterpretationService {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl HttpInterpretationService {
    pub fn new(base_url: Option<String>) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: build_http_client(MODEL_TIMEOUT)?,
            base_url,
        })
    }
}

#[async_trait]
impl InterpretationService for HttpInterpretationService {
    async fn interpret(
        &self,
        request: &InterpretationRequest,
    ) -> Result<InterpretationResult, UpstreamError> {
        let url = endpoint(upstreams::INTERPRETATION, self.base_url.as_deref(), "interpret")?;
        tracing::debug!(
            symbol = %request.symbol,
            lens = %request.decision_lens,
            "Calling interpretation service"
        );
        let response = self.client.post(&url).json(request).send().await?;
        read_json(response).await
    }
}
