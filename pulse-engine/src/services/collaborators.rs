//! Contracts of the outbound collaborators
//!
//! Each collaborator is a trait object so the HTTP clients can be swapped
//! for in-process fakes in tests.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::models::interpretation::{Bias, LensOverlay};
use crate::models::message::{RawMessage, SentimentTag};
use crate::models::observed::{ObservedState, Polarity};
use crate::models::quote::QuoteResponse;
use crate::models::snapshot::{PeriodType, SnapshotWindow};
use crate::models::temporal::{DecisionLens, NarrativePersistence, TemporalComposite};
use crate::resilience::UpstreamError;

/// Social-message provider
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch_messages(
        &self,
        symbol: &str,
        window: &SnapshotWindow,
    ) -> Result<Vec<RawMessage>, UpstreamError>;
}

/// Text-classification service turning messages into narratives and emotions
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult, UpstreamError>;
}

/// Interpretation service producing per-lens overlays and a summary
#[async_trait]
pub trait InterpretationService: Send + Sync {
    async fn interpret(
        &self,
        request: &InterpretationRequest,
    ) -> Result<InterpretationResult, UpstreamError>;
}

/// Market-quote provider
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch_quote(
        &self,
        symbol: &str,
        range: &str,
        interval: &str,
    ) -> Result<QuoteResponse, UpstreamError>;
}

/// The four collaborators, shared across services
#[derive(Clone)]
pub struct Collaborators {
    pub messages: Arc<dyn MessageSource>,
    pub extraction: Arc<dyn ExtractionService>,
    pub interpretation: Arc<dyn InterpretationService>,
    pub quotes: Arc<dyn QuoteProvider>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMessage {
    pub id: String,
    pub body: String,
    pub sentiment: SentimentTag,
}

/// Narrative carried over from the prior snapshot so ids stay stable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorNarrative {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub symbol: String,
    pub period_type: PeriodType,
    pub messages: Vec<ExtractionMessage>,
    pub prior_narratives: Vec<PriorNarrative>,
}

impl ExtractionRequest {
    pub fn new(
        symbol: &str,
        period_type: PeriodType,
        messages: &[RawMessage],
        prior: Option<&ObservedState>,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            period_type,
            messages: messages
                .iter()
                .map(|m| ExtractionMessage {
                    id: m.id.clone(),
                    body: m.body.clone(),
                    sentiment: m.sentiment,
                })
                .collect(),
            prior_narratives: prior
                .map(|p| {
                    p.narratives
                        .iter()
                        .map(|n| PriorNarrative {
                            id: n.id.clone(),
                            label: n.label.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractedNarrative {
    pub id: String,
    pub label: String,
    pub prevalence_pct: f64,
    pub sentiment_skew: f64,
    pub dominant_emotions: Vec<String>,
    pub co_occurring_narratives: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractedEmotion {
    pub emotion: String,
    pub intensity: f64,
    pub polarity: Option<Polarity>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractionResult {
    pub narratives: Vec<ExtractedNarrative>,
    pub emotions: Vec<ExtractedEmotion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretationRequest {
    pub symbol: String,
    pub period_type: PeriodType,
    pub decision_lens: DecisionLens,
    pub observed_state: ObservedState,
    pub temporal: TemporalComposite,
    pub narrative_persistence: Vec<NarrativePersistence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InterpretationResult {
    pub summary: String,
    pub bias: Option<Bias>,
    pub lens_overlays: BTreeMap<String, LensOverlay>,
}

/// Base URL of a collaborator, or `Unavailable` when none is configured
pub(crate) fn endpoint(
    upstream: &str,
    base_url: Option<&str>,
    path: &str,
) -> Result<String, UpstreamError> {
    let base = base_url
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| UpstreamError::Unavailable(format!("{} (no base URL configured)", upstream)))?;
    Ok(format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/')))
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, UpstreamError> {
    reqwest::Client::builder()
        .user_agent(concat!("pulse-engine/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| UpstreamError::Transport(e.to_string()))
}

/// Decode a JSON response, classifying non-2xx statuses and bad bodies
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, UpstreamError> {
    let status = response.status();
    if !status.is_success() {
        return Err(UpstreamError::from_status(status.as_u16()));
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Malformed(e.to_string()))
}
