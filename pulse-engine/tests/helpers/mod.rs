//! Shared fixtures for integration tests: in-process collaborators, a
//! manual clock and an in-memory database

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use chrono::{DateTime, Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use pulse_common::{Clock, ManualClock};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use pulse_engine::config::EngineConfig;
use pulse_engine::models::message::{RawMessage, SentimentTag};
use pulse_engine::models::quote::{PricePoint, QuoteResponse};
use pulse_engine::models::snapshot::SnapshotWindow;
use pulse_engine::resilience::{RetryPolicy, UpstreamError};
use pulse_engine::services::collaborators::{
    ExtractedEmotion, ExtractedNarrative, ExtractionRequest, ExtractionResult,
    InterpretationRequest, InterpretationResult,
};
use pulse_engine::services::{
    Collaborators, ExtractionService, InterpretationService, MessageSource, QuoteProvider,
};
use pulse_engine::{AppState, RetryPolicies};

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Wednesday 2026-03-04 15:10 UTC, inside trading hours
pub fn trading_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 15, 10, 0).unwrap()
}

pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    pulse_engine::db::init_tables(&pool).await.unwrap();
    pool
}

/// Message source returning `count` messages per symbol inside the window
pub struct FakeMessages {
    default_count: usize,
    per_symbol: Mutex<HashMap<String, usize>>,
    pub calls: AtomicUsize,
    clock: Arc<ManualClock>,
    advance_per_call: Mutex<Duration>,
}

impl FakeMessages {
    pub fn new(clock: Arc<ManualClock>, default_count: usize) -> Self {
        Self {
            default_count,
            per_symbol: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            clock,
            advance_per_call: Mutex::new(Duration::zero()),
        }
    }

    pub fn set_count(&self, symbol: &str, count: usize) {
        self.per_symbol.lock().unwrap().insert(symbol.to_string(), count);
    }

    /// Simulate slow upstreams by moving the clock on every fetch
    pub fn advance_clock_per_call(&self, delta: Duration) {
        *self.advance_per_call.lock().unwrap() = delta;
    }
}

#[async_trait]
impl MessageSource for FakeMessages {
    async fn fetch_messages(
        &self,
        symbol: &str,
        window: &SnapshotWindow,
    ) -> Result<Vec<RawMessage>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delta = *self.advance_per_call.lock().unwrap();
        self.clock.advance(delta);

        let count = self
            .per_symbol
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or(self.default_count);
        Ok((0..count)
            .map(|i| RawMessage {
                id: format!("{}-{}", symbol, i),
                author_id: format!("author-{}", i % 7),
                created_at: window.start + Duration::seconds(i as i64 + 1),
                body: format!("{} message {}", symbol, i),
                sentiment: if i % 3 == 0 { SentimentTag::Bearish } else { SentimentTag::Bullish },
            })
            .collect())
    }
}

/// Extraction service with a fixed answer; chosen symbols fail with 500
pub struct FakeExtraction {
    pub calls: AtomicUsize,
    failing: Mutex<HashSet<String>>,
}

impl FakeExtraction {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_for(&self, symbol: &str) {
        self.failing.lock().unwrap().insert(symbol.to_string());
    }
}

#[async_trait]
impl ExtractionService for FakeExtraction {
    async fn extract(&self, request: &ExtractionRequest) -> Result<ExtractionResult, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&request.symbol) {
            return Err(UpstreamError::Status(500));
        }
        Ok(ExtractionResult {
            narratives: vec![
                ExtractedNarrative {
                    id: "ai-capex".to_string(),
                    label: "AI capex".to_string(),
                    prevalence_pct: 55.0,
                    sentiment_skew: 0.4,
                    dominant_emotions: vec!["Optimism".to_string()],
                    confidence: 0.8,
                    ..Default::default()
                },
                ExtractedNarrative {
                    id: "margin-pressure".to_string(),
                    label: "Margin pressure".to_string(),
                    prevalence_pct: 25.0,
                    sentiment_skew: -0.3,
                    dominant_emotions: vec!["Anxiety".to_string()],
                    confidence: 0.7,
                    ..Default::default()
                },
            ],
            emotions: vec![
                ExtractedEmotion {
                    emotion: "Optimism".to_string(),
                    intensity: 60.0,
                    confidence: 0.8,
                    ..Default::default()
                },
                ExtractedEmotion {
                    emotion: "Anxiety".to_string(),
                    intensity: 30.0,
                    confidence: 0.6,
                    ..Default::default()
                },
            ],
        })
    }
}

/// Interpretation service that either answers or is down
pub struct FakeInterpretation {
    pub calls: AtomicUsize,
    available: Mutex<bool>,
}

impl FakeInterpretation {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            available: Mutex::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        *self.available.lock().unwrap() = available;
    }
}

#[async_trait]
impl InterpretationService for FakeInterpretation {
    async fn interpret(
        &self,
        request: &InterpretationRequest,
    ) -> Result<InterpretationResult, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !*self.available.lock().unwrap() {
            return Err(UpstreamError::Status(503));
        }
        Ok(InterpretationResult {
            summary: format!("{} model summary", request.symbol),
            bias: None,
            lens_overlays: Default::default(),
        })
    }
}

pub fn sample_quote(price: f64) -> QuoteResponse {
    QuoteResponse {
        prices: vec![PricePoint {
            timestamp: 1_772_636_400,
            open: price - 1.0,
            high: price + 1.0,
            low: price - 2.0,
            close: price,
            volume: 1_000,
        }],
        current_price: price,
        previous_close: price - 1.0,
        change: 1.0,
        change_percent: round2(100.0 / (price - 1.0)),
        market_state: "REGULAR".to_string(),
        degraded: None,
        reason: None,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Quote provider replaying scripted results, then repeating the fallback
pub struct FakeQuotes {
    pub calls: AtomicUsize,
    script: Mutex<VecDeque<Result<QuoteResponse, UpstreamError>>>,
    fallback: Mutex<Result<QuoteResponse, UpstreamError>>,
}

impl FakeQuotes {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(sample_quote(101.0))),
        }
    }

    pub fn push(&self, result: Result<QuoteResponse, UpstreamError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn always(&self, result: Result<QuoteResponse, UpstreamError>) {
        *self.fallback.lock().unwrap() = result;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteProvider for FakeQuotes {
    async fn fetch_quote(
        &self,
        _symbol: &str,
        _range: &str,
        _interval: &str,
    ) -> Result<QuoteResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        self.fallback.lock().unwrap().clone()
    }
}

/// App state wired to fakes, with every delay removed
pub struct Harness {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub messages: Arc<FakeMessages>,
    pub extraction: Arc<FakeExtraction>,
    pub interpretation: Arc<FakeInterpretation>,
    pub quotes: Arc<FakeQuotes>,
}

pub fn test_config(watchlist: &[&str]) -> EngineConfig {
    EngineConfig {
        admin_token: Some(ADMIN_TOKEN.to_string()),
        watchlist: watchlist.iter().map(|s| s.to_string()).collect(),
        scheduler_enabled: false,
        inter_symbol_delay: StdDuration::ZERO,
        inter_date_delay: StdDuration::ZERO,
        ..Default::default()
    }
}

impl Harness {
    pub async fn new(watchlist: &[&str]) -> Self {
        Self::with_config(test_config(watchlist), 12).await
    }

    pub async fn with_config(config: EngineConfig, messages_per_window: usize) -> Self {
        let clock = Arc::new(ManualClock::new(trading_now()));
        let messages = Arc::new(FakeMessages::new(clock.clone(), messages_per_window));
        let extraction = Arc::new(FakeExtraction::new());
        let interpretation = Arc::new(FakeInterpretation::new());
        let quotes = Arc::new(FakeQuotes::new());

        let collaborators = Collaborators {
            messages: messages.clone(),
            extraction: extraction.clone(),
            interpretation: interpretation.clone(),
            quotes: quotes.clone(),
        };
        let policies = RetryPolicies {
            proxy: RetryPolicy::proxy().without_delays(),
            collaborator: RetryPolicy::collaborator().without_delays(),
        };
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let state =
            AppState::with_policies(memory_pool().await, config, collaborators, dyn_clock, policies);

        Self {
            state,
            clock,
            messages,
            extraction,
            interpretation,
            quotes,
        }
    }

    pub fn router(&self) -> axum::Router {
        pulse_engine::build_router(self.state.clone())
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn admin_post(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Parse every `data: {...}` frame of an SSE body
pub fn sse_events(raw: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(raw)
        .lines()
        .filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
        .filter_map(|json| serde_json::from_str(json.trim()).ok())
        .collect()
}
