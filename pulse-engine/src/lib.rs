//! pulse-engine library interface
//!
//! Exposes the application state and router for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod resilience;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use pulse_common::Clock;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::EngineConfig;
use crate::models::quote::QuoteResponse;
use crate::resilience::{upstreams, CircuitBreaker, MemoryCache, ResilientProxy, RetryPolicy, UpstreamError};
use crate::services::{
    BackfillStreamer, Collaborators, HealthAggregator, HttpExtractionService,
    HttpInterpretationService, HttpMessageSource, HttpQuoteProvider, OrchestratorSettings,
    QuoteProvider, SnapshotOrchestrator, SnapshotPipeline,
};

/// Retry policies for the two call paths
#[derive(Debug, Clone)]
pub struct RetryPolicies {
    /// Quote proxy attempts
    pub proxy: RetryPolicy,
    /// Extraction, interpretation and message-source attempts
    pub collaborator: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            proxy: RetryPolicy::proxy(),
            collaborator: RetryPolicy::collaborator(),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<EngineConfig>,
    pub clock: Arc<dyn Clock>,
    pub breaker: CircuitBreaker,
    pub quotes: Arc<dyn QuoteProvider>,
    pub quote_proxy: ResilientProxy<QuoteResponse>,
    pub orchestrator: SnapshotOrchestrator,
    pub backfill: BackfillStreamer,
    pub health: HealthAggregator,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        config: EngineConfig,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_policies(db, config, collaborators, clock, RetryPolicies::default())
    }

    pub fn with_policies(
        db: SqlitePool,
        config: EngineConfig,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        policies: RetryPolicies,
    ) -> Self {
        let breaker = CircuitBreaker::new(config.breaker, clock.clone());
        let quote_cache: Arc<MemoryCache<QuoteResponse>> = Arc::new(MemoryCache::new(clock.clone()));
        let quote_proxy = ResilientProxy::new(
            upstreams::QUOTES,
            breaker.clone(),
            quote_cache.clone(),
            policies.proxy,
        );

        let pipeline = SnapshotPipeline::new(
            db.clone(),
            collaborators.clone(),
            breaker.clone(),
            clock.clone(),
            config.decision_lens,
            policies.collaborator,
        );
        let orchestrator = SnapshotOrchestrator::new(
            pipeline.clone(),
            OrchestratorSettings {
                watchlist: config.watchlist.clone(),
                trading_hours: config.trading_hours,
                run_budget: config.run_budget,
                inter_symbol_delay: config.inter_symbol_delay,
            },
        );
        let backfill = BackfillStreamer::new(pipeline, config.inter_date_delay);
        let health = HealthAggregator::new(
            db.clone(),
            breaker.clone(),
            quote_cache,
            upstreams::ALL.iter().map(|id| id.to_string()).collect(),
            clock.clone(),
        );

        Self {
            db,
            config: Arc::new(config),
            startup_time: clock.now(),
            clock,
            breaker,
            quotes: collaborators.quotes,
            quote_proxy,
            orchestrator,
            backfill,
            health,
        }
    }

    pub fn quote_cache(&self) -> &Arc<MemoryCache<QuoteResponse>> {
        self.quote_proxy.cache()
    }
}

/// HTTP clients for every configured collaborator
pub fn http_collaborators(config: &EngineConfig) -> Result<Collaborators, UpstreamError> {
    let urls = &config.upstreams;
    Ok(Collaborators {
        messages: Arc::new(HttpMessageSource::new(
            urls.messages.clone(),
            config.messages_per_second,
        )?),
        extraction: Arc::new(HttpExtractionService::new(urls.extraction.clone())?),
        interpretation: Arc::new(HttpInterpretationService::new(urls.interpretation.clone())?),
        quotes: Arc::new(HttpQuoteProvider::new(urls.quotes.clone())?),
    })
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::quote_routes())
        .merge(api::health_routes())
        .merge(api::snapshot_routes())
        .merge(api::admin_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
