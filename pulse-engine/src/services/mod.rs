//! Engine services: metrics, fusion, the snapshot pipeline and its drivers,
//! health, and the collaborator clients

pub mod backfill;
pub mod collaborators;
pub mod health_aggregator;
pub mod interpretation;
pub mod message_client;
pub mod model_clients;
pub mod pipeline;
pub mod quote_client;
pub mod scheduler;
pub mod signal_metrics;
pub mod snapshot_orchestrator;
pub mod temporal_fusion;

pub use backfill::{BackfillAction, BackfillEvent, BackfillRequest, BackfillStreamer};
pub use collaborators::{
    Collaborators, ExtractionService, InterpretationService, MessageSource, QuoteProvider,
};
pub use health_aggregator::{HealthAggregator, HealthReport, HealthStatus, HitRateBucket};
pub use message_client::HttpMessageSource;
pub use model_clients::{HttpExtractionService, HttpInterpretationService};
pub use pipeline::{SnapshotPipeline, UnitOutcome};
pub use quote_client::HttpQuoteProvider;
pub use scheduler::Scheduler;
pub use snapshot_orchestrator::{
    OrchestratorSettings, RunReport, SnapshotOrchestrator, SymbolOutcome, TradingHours,
};
