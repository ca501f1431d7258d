//! Observed state: narratives, emotions, and the metrics derived from them
//!
//! Stored as a JSON document inside each snapshot row. Every record defaults
//! missing fields so older or partially-written documents still load.

use serde::{Deserialize, Serialize};

/// Fixed emotion vocabulary, with the polarity each emotion carries by default
pub const EMOTION_VOCABULARY: [(&str, Polarity); 15] = [
    ("Euphoria", Polarity::Bullish),
    ("Greed", Polarity::Bullish),
    ("Optimism", Polarity::Bullish),
    ("Hope", Polarity::Bullish),
    ("Excitement", Polarity::Bullish),
    ("Confidence", Polarity::Bullish),
    ("Relief", Polarity::Bullish),
    ("Neutrality", Polarity::Neutral),
    ("Skepticism", Polarity::Neutral),
    ("Anxiety", Polarity::Bearish),
    ("Fear", Polarity::Bearish),
    ("Panic", Polarity::Bearish),
    ("Capitulation", Polarity::Bearish),
    ("Frustration", Polarity::Bearish),
    ("Anger", Polarity::Bearish),
];

/// Canonical vocabulary spelling and default polarity for `name`, if it is one of the 15
pub fn canonical_emotion(name: &str) -> Option<(&'static str, Polarity)> {
    let name = name.trim();
    EMOTION_VOCABULARY
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VelocityDirection {
    Accelerating,
    Decelerating,
    #[default]
    Stable,
}

/// Rate-of-change of a change: how fast a narrative or emotion is moving
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Velocity {
    pub direction: VelocityDirection,
    pub magnitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Volatility {
    #[default]
    Low,
    Moderate,
    High,
}

impl Volatility {
    /// Bucket an absolute intensity change
    pub fn from_change(change: f64) -> Self {
        let change = change.abs();
        if change >= 25.0 {
            Volatility::High
        } else if change >= 10.0 {
            Volatility::Moderate
        } else {
            Volatility::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

/// One belief/topic cluster within a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NarrativeState {
    /// Stable slug, unique within a snapshot
    pub id: String,
    pub label: String,
    /// Share of messages, 0-100
    pub prevalence_pct: f64,
    pub change_vs_prior: f64,
    pub velocity: Velocity,
    /// -1 (bearish) to 1 (bullish)
    pub sentiment_skew: f64,
    pub dominant_emotions: Vec<String>,
    pub co_occurring_narratives: Vec<String>,
    pub confidence: f64,
}

/// One of the 15 vocabulary emotions within a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EmotionState {
    pub emotion: String,
    /// 0-100
    pub intensity: f64,
    pub change_vs_prior: f64,
    pub volatility: Volatility,
    pub velocity: Velocity,
    pub polarity: Polarity,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusStrength {
    Strong,
    Moderate,
    #[default]
    Weak,
}

/// Who is talking and how lopsided the bull/bear split is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConcentrationMetrics {
    pub top_10_users_pct: f64,
    pub bull_bear_polarization: f64,
    pub consensus_strength: ConsensusStrength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    #[default]
    High,
}

/// Narrative coherence score ("NCS") and its components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoherenceResult {
    /// 0-100
    pub score: u32,
    /// Normalized Shannon entropy of prevalence, 0 concentrated .. 1 scattered
    pub entropy: f64,
    pub emotion_convergence: f64,
    pub velocity_stability: f64,
    pub dominant_share: f64,
    pub risk_level: RiskLevel,
    pub risk_drivers: Vec<String>,
}

impl Default for CoherenceResult {
    fn default() -> Self {
        Self {
            score: 0,
            entropy: 1.0,
            emotion_convergence: 0.0,
            velocity_stability: 0.0,
            dominant_share: 0.0,
            risk_level: RiskLevel::High,
            risk_drivers: vec!["No narrative data available".to_string()],
        }
    }
}

/// Data confidence and the four inputs it is weighted from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DataConfidence {
    pub score: f64,
    pub volume_percentile: f64,
    pub author_breadth: f64,
    pub narrative_coherence_proxy: f64,
    pub temporal_stability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SignalFlag {
    pub active: bool,
    /// 0-1
    pub strength: f64,
}

impl SignalFlag {
    pub fn inactive() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SignalFlags {
    pub emotion_inflection: SignalFlag,
    pub narrative_shift: SignalFlag,
    pub consensus_breakdown: SignalFlag,
    pub capitulation_detected: SignalFlag,
    pub euphoria_risk: SignalFlag,
}

/// Everything measured for one symbol over one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ObservedState {
    pub narratives: Vec<NarrativeState>,
    pub emotions: Vec<EmotionState>,
    pub coherence: CoherenceResult,
    pub concentration: ConcentrationMetrics,
    pub confidence: DataConfidence,
    pub signals: SignalFlags,
    /// Id of the most prevalent narrative
    pub dominant_narrative: Option<String>,
    /// Name of the most intense emotion
    pub dominant_emotion: Option<String>,
}

impl ObservedState {
    /// Narrative with the highest prevalence
    pub fn dominant_narrative(&self) -> Option<&NarrativeState> {
        self.narratives
            .iter()
            .max_by(|a, b| a.prevalence_pct.total_cmp(&b.prevalence_pct))
    }

    /// Emotion with the highest intensity
    pub fn dominant_emotion(&self) -> Option<&EmotionState> {
        self.emotions
            .iter()
            .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
    }

    pub fn narrative(&self, id: &str) -> Option<&NarrativeState> {
        self.narratives.iter().find(|n| n.id == id)
    }

    pub fn emotion(&self, name: &str) -> Option<&EmotionState> {
        self.emotions
            .iter()
            .find(|e| e.emotion.eq_ignore_ascii_case(name))
    }

    /// Intensity of `name`, 0 when absent
    pub fn emotion_intensity(&self, name: &str) -> f64 {
        self.emotion(name).map(|e| e.intensity).unwrap_or(0.0)
    }

    /// Fill the `dominant_*` ids from the current lists
    pub fn refresh_dominants(&mut self) {
        self.dominant_narrative = self.dominant_narrative().map(|n| n.id.clone());
        self.dominant_emotion = self.dominant_emotion().map(|e| e.emotion.clone());
    }

    /// Decode a stored document, falling back to an empty state on bad shape
    pub fn from_json_lenient(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Stored observed_state did not parse; using empty state");
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_has_fifteen_unique_emotions() {
        let mut names: Vec<&str> = EMOTION_VOCABULARY.iter().map(|(n, _)| *n).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 15);
    }

    #[test]
    fn test_canonical_emotion_is_case_insensitive() {
        assert_eq!(canonical_emotion(" capitulation "), Some(("Capitulation", Polarity::Bearish)));
        assert_eq!(canonical_emotion("GREED"), Some(("Greed", Polarity::Bullish)));
        assert_eq!(canonical_emotion("boredom"), None);
    }

    #[test]
    fn test_partial_document_defaults() {
        let state = ObservedState::from_json_lenient(
            r#"{"narratives":[{"id":"ai-capex","prevalence_pct":42.5}]}"#,
        );
        assert_eq!(state.narratives.len(), 1);
        assert_eq!(state.narratives[0].velocity.direction, VelocityDirection::Stable);
        assert!(state.emotions.is_empty());
        assert_eq!(state.coherence.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_garbage_document_yields_empty_state() {
        let state = ObservedState::from_json_lenient("[1,2,3]");
        assert_eq!(state, ObservedState::default());
    }

    #[test]
    fn test_dominants() {
        let state = ObservedState {
            narratives: vec![
                NarrativeState { id: "a".into(), prevalence_pct: 10.0, ..Default::default() },
                NarrativeState { id: "b".into(), prevalence_pct: 55.0, ..Default::default() },
            ],
            emotions: vec![
                EmotionState { emotion: "Fear".into(), intensity: 70.0, ..Default::default() },
                EmotionState { emotion: "Hope".into(), intensity: 20.0, ..Default::default() },
            ],
            ..Default::default()
        };
        assert_eq!(state.dominant_narrative().map(|n| n.id.as_str()), Some("b"));
        assert_eq!(state.dominant_emotion().map(|e| e.emotion.as_str()), Some("Fear"));
        assert_eq!(state.emotion_intensity("fear"), 70.0);
        assert_eq!(state.emotion_intensity("Panic"), 0.0);

        let mut state = state;
        state.refresh_dominants();
        assert_eq!(state.dominant_narrative.as_deref(), Some("b"));
        assert_eq!(state.dominant_emotion.as_deref(), Some("Fear"));
    }

    #[test]
    fn test_volatility_buckets() {
        assert_eq!(Volatility::from_change(-3.0), Volatility::Low);
        assert_eq!(Volatility::from_change(12.0), Volatility::Moderate);
        assert_eq!(Volatility::from_change(-30.0), Volatility::High);
    }
}
