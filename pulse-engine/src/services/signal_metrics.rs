//! Signal metrics: pure functions over current vs. prior observed state
//!
//! The coherence weights (30/25/25/20) and confidence weights
//! (0.3/0.25/0.25/0.2) are fixed calibration constants.

use std::collections::HashMap;

use crate::models::message::{RawMessage, SentimentTag};
use crate::models::observed::{
    CoherenceResult, ConcentrationMetrics, ConsensusStrength, DataConfidence, EmotionState,
    NarrativeState, ObservedState, Polarity, RiskLevel, SignalFlag, SignalFlags, Velocity,
    VelocityDirection,
};

/// Round to `places` decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Velocity of a change relative to the prior change
///
/// ```
/// use pulse_engine::services::signal_metrics::velocity;
/// use pulse_engine::models::VelocityDirection;
///
/// let v = velocity(20.0, Some(10.0));
/// assert_eq!(v.direction, VelocityDirection::Accelerating);
/// assert_eq!(v.magnitude, 1.0);
/// ```
pub fn velocity(current_change: f64, prior_change: Option<f64>) -> Velocity {
    let Some(prior) = prior_change else {
        return Velocity::default();
    };

    let acceleration = current_change - prior;
    let magnitude = round_to(acceleration.abs() / prior.abs().max(1.0), 3);
    let direction = if magnitude < 0.1 {
        VelocityDirection::Stable
    } else if acceleration > 0.0 {
        VelocityDirection::Accelerating
    } else {
        VelocityDirection::Decelerating
    };

    Velocity { direction, magnitude }
}

/// Author concentration and bull/bear polarization of a message set
pub fn concentration(messages: &[RawMessage]) -> ConcentrationMetrics {
    let total = messages.len();

    let mut per_author: HashMap<&str, usize> = HashMap::new();
    for message in messages {
        *per_author.entry(message.author_id.as_str()).or_insert(0) += 1;
    }
    let mut counts: Vec<usize> = per_author.into_values().collect();
    counts.sort_unstable_by(|a, b| b.cmp(a));
    let top_10: usize = counts.iter().take(10).sum();

    let top_10_users_pct = if total > 0 {
        round_to(top_10 as f64 / total as f64 * 100.0, 1)
    } else {
        0.0
    };

    let bullish = messages
        .iter()
        .filter(|m| m.sentiment == SentimentTag::Bullish)
        .count() as f64;
    let bearish = messages
        .iter()
        .filter(|m| m.sentiment == SentimentTag::Bearish)
        .count() as f64;
    let bull_bear_polarization = round_to((bullish - bearish).abs() / (bullish + bearish).max(1.0), 2);

    let consensus_strength = if bull_bear_polarization > 0.7 {
        ConsensusStrength::Strong
    } else if bull_bear_polarization > 0.4 {
        ConsensusStrength::Moderate
    } else {
        ConsensusStrength::Weak
    };

    ConcentrationMetrics {
        top_10_users_pct,
        bull_bear_polarization,
        consensus_strength,
    }
}

/// Normalized Shannon entropy of a prevalence distribution
///
/// 0 when all weight sits on one narrative, 1 when spread evenly.
pub fn normalized_entropy(prevalences: &[f64]) -> f64 {
    let n = prevalences.len();
    if n <= 1 {
        return 0.0;
    }
    let total: f64 = prevalences.iter().filter(|p| **p > 0.0).sum();
    if total <= 0.0 {
        return 1.0;
    }

    let h: f64 = prevalences
        .iter()
        .filter(|p| **p > 0.0)
        .map(|p| {
            let share = p / total;
            -share * share.ln()
        })
        .sum();

    (h / (n as f64).ln()).clamp(0.0, 1.0)
}

/// Narrative coherence score and its components
pub fn coherence(narratives: &[NarrativeState], emotions: &[EmotionState]) -> CoherenceResult {
    if narratives.is_empty() {
        return CoherenceResult::default();
    }

    let prevalences: Vec<f64> = narratives.iter().map(|n| n.prevalence_pct).collect();
    let entropy = normalized_entropy(&prevalences);

    let bullish = emotions.iter().filter(|e| e.polarity == Polarity::Bullish).count() as f64;
    let bearish = emotions.iter().filter(|e| e.polarity == Polarity::Bearish).count() as f64;
    let polarized = bullish + bearish;
    let emotion_convergence = if polarized > 0.0 {
        (bullish - bearish).abs() / polarized
    } else {
        0.5
    };

    let avg_velocity = narratives.iter().map(|n| n.velocity.magnitude).sum::<f64>()
        / narratives.len() as f64;
    let velocity_stability = (1.0 - avg_velocity).max(0.0);

    let dominant_share = prevalences.iter().copied().fold(0.0, f64::max);

    let raw = 30.0 * (1.0 - entropy)
        + 25.0 * emotion_convergence
        + 25.0 * velocity_stability
        + 20.0 * (dominant_share / 100.0);
    let score = raw.round().clamp(0.0, 100.0) as u32;

    let mut risk_drivers = Vec::new();
    if entropy > 0.7 {
        risk_drivers.push("Narratives are fragmented across many topics".to_string());
    }
    if emotion_convergence < 0.3 {
        risk_drivers.push("Emotions are split between bullish and bearish".to_string());
    }
    if velocity_stability < 0.4 {
        risk_drivers.push("Narrative velocity is unstable".to_string());
    }
    if dominant_share < 20.0 {
        risk_drivers.push("No narrative holds 20% of the conversation".to_string());
    }

    let risk_level = if risk_drivers.len() >= 3 || score < 30 {
        RiskLevel::High
    } else if !risk_drivers.is_empty() || score < 50 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    };

    CoherenceResult {
        score,
        entropy: round_to(entropy, 3),
        emotion_convergence: round_to(emotion_convergence, 3),
        velocity_stability: round_to(velocity_stability, 3),
        dominant_share: round_to(dominant_share, 1),
        risk_level,
        risk_drivers,
    }
}

/// Data confidence for a snapshot
pub fn confidence(
    message_count: u32,
    unique_authors: u32,
    narrative_count: usize,
    prior: Option<&ObservedState>,
) -> DataConfidence {
    let volume_percentile = (f64::from(message_count) / 500.0).min(1.0);
    let author_breadth = if message_count > 0 {
        (f64::from(unique_authors) / f64::from(message_count)).min(1.0)
    } else {
        0.0
    };
    let narrative_coherence_proxy = if narrative_count > 0 {
        (1.0 - (narrative_count as f64 - 4.0).abs() / 8.0).max(0.0)
    } else {
        0.5
    };
    let temporal_stability = match prior.and_then(|p| p.dominant_narrative()) {
        Some(_) => 0.7,
        None => 0.5,
    };

    let score = round_to(
        0.3 * volume_percentile
            + 0.25 * author_breadth
            + 0.25 * narrative_coherence_proxy
            + 0.2 * temporal_stability,
        2,
    );

    DataConfidence {
        score,
        volume_percentile: round_to(volume_percentile, 3),
        author_breadth: round_to(author_breadth, 3),
        narrative_coherence_proxy: round_to(narrative_coherence_proxy, 3),
        temporal_stability,
    }
}

fn shift_flag(changed: bool, delta: f64, threshold: f64, scale: f64) -> SignalFlag {
    if !changed && delta <= threshold {
        return SignalFlag::inactive();
    }
    let bonus = if changed { 0.3 } else { 0.0 };
    SignalFlag {
        active: true,
        strength: round_to((delta / scale + bonus).min(1.0), 2),
    }
}

/// Discrete signal flags for the current state
pub fn signals(
    current: &ObservedState,
    prior: Option<&ObservedState>,
    concentration: &ConcentrationMetrics,
) -> SignalFlags {
    let mut flags = SignalFlags::default();

    if let Some(prior) = prior {
        if let (Some(now), Some(then)) = (current.dominant_emotion(), prior.dominant_emotion()) {
            let changed = !now.emotion.eq_ignore_ascii_case(&then.emotion);
            let delta = (now.intensity - then.intensity).abs();
            flags.emotion_inflection = shift_flag(changed, delta, 20.0, 30.0);
        }
        if let (Some(now), Some(then)) = (current.dominant_narrative(), prior.dominant_narrative()) {
            let changed = now.id != then.id;
            let delta = (now.prevalence_pct - then.prevalence_pct).abs();
            flags.narrative_shift = shift_flag(changed, delta, 15.0, 20.0);
        }
    }

    if concentration.bull_bear_polarization > 0.7 {
        flags.consensus_breakdown = SignalFlag {
            active: true,
            strength: concentration.bull_bear_polarization.min(1.0),
        };
    }

    let capitulation = current.emotion_intensity("Capitulation");
    let rising = prior.map_or(true, |p| capitulation > p.emotion_intensity("Capitulation"));
    if capitulation > 50.0 && rising {
        flags.capitulation_detected = SignalFlag {
            active: true,
            strength: round_to(capitulation / 100.0, 2),
        };
    }

    let euphoria = current.emotion_intensity("Euphoria") + current.emotion_intensity("Greed");
    if euphoria > 100.0 {
        flags.euphoria_risk = SignalFlag {
            active: true,
            strength: round_to((euphoria / 150.0).min(1.0), 2),
        };
    }

    flags
}
