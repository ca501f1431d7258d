//! Interpretation document stored alongside the observed state

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::temporal::{DecisionLens, NarrativePersistence, TemporalComposite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl Bias {
    /// Bias implied by an average sentiment skew in [-1, 1]
    pub fn from_skew(average_skew: f64) -> Self {
        if average_skew > 0.15 {
            Bias::Bullish
        } else if average_skew < -0.15 {
            Bias::Bearish
        } else {
            Bias::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Bias::Bullish => "bullish",
            Bias::Bearish => "bearish",
            Bias::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    #[default]
    Monitor,
    InsufficientSignal,
}

/// Per-lens decision overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LensOverlay {
    pub readiness: Readiness,
    pub overlay: String,
}

/// Who produced the interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterpretationSource {
    Model,
    #[default]
    HeuristicFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Interpretation {
    pub summary: String,
    pub bias: Bias,
    /// Keyed by lens name
    pub lens_overlays: BTreeMap<String, LensOverlay>,
    pub source: InterpretationSource,
    pub decision_lens: DecisionLens,
    pub temporal: Option<TemporalComposite>,
    pub narrative_persistence: Vec<NarrativePersistence>,
}

impl Interpretation {
    /// Decode a stored document, falling back to an empty interpretation on bad shape
    pub fn from_json_lenient(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Stored interpretation did not parse; using empty interpretation");
            Self::default()
        })
    }
}
