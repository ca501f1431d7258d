//! Domain records shared by the services, persistence and HTTP layers

pub mod interpretation;
pub mod message;
pub mod observed;
pub mod quote;
pub mod snapshot;
pub mod temporal;

pub use interpretation::{Bias, Interpretation, InterpretationSource, LensOverlay, Readiness};
pub use message::{RawMessage, SentimentTag};
pub use observed::{
    CoherenceResult, ConcentrationMetrics, DataConfidence, EmotionState, NarrativeState,
    ObservedState, SignalFlags, Velocity, VelocityDirection,
};
pub use quote::{PricePoint, QuoteResponse};
pub use snapshot::{PeriodType, Snapshot, SnapshotWindow, INTERPRETATION_VERSION};
pub use temporal::{DecisionLens, NarrativePersistence, PeriodWeights, TemporalComposite};
