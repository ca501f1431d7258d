//! Temporal fusion across the four snapshot horizons
//!
//! Weights come from the decision lens's base table and then pass through
//! the safety rails: hourly is capped, strategic lenses drop hourly unless
//! an extreme-velocity override fires, and the result is renormalized.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

use crate::models::observed::ObservedState;
use crate::models::snapshot::{PeriodType, Snapshot};
use crate::models::temporal::{
    CompositeEmotion, CompositeNarrative, ConfidenceBasis, DataFreshness, DecisionLens,
    NarrativePersistence, PeriodFreshness, PeriodWeights, PersistenceClass, TemporalAttribution,
    TemporalComposite, TemporalConsistency,
};

use super::signal_metrics::round_to;

/// Hard ceiling on the hourly weight
pub const HOURLY_WEIGHT_CAP: f64 = 0.20;
/// Hourly narrative velocity at which strategic lenses keep hourly data
pub const OVERRIDE_VELOCITY: f64 = 2.5;
pub const MAX_COMPOSITE_NARRATIVES: usize = 8;
pub const MAX_COMPOSITE_EMOTIONS: usize = 6;
/// Daily snapshots scanned for persistence
pub const PERSISTENCE_LOOKBACK_DAYS: usize = 30;

/// Observed state of one period as seen by the fusion step
#[derive(Debug, Clone, Copy)]
pub struct PeriodView<'a> {
    pub snapshot_start: DateTime<Utc>,
    pub state: &'a ObservedState,
}

impl<'a> From<&'a Snapshot> for PeriodView<'a> {
    fn from(snapshot: &'a Snapshot) -> Self {
        Self {
            snapshot_start: snapshot.snapshot_start,
            state: &snapshot.observed_state,
        }
    }
}

/// Most recent view per period; any may be absent
#[derive(Debug, Clone, Copy, Default)]
pub struct Siblings<'a> {
    pub hourly: Option<PeriodView<'a>>,
    pub daily: Option<PeriodView<'a>>,
    pub weekly: Option<PeriodView<'a>>,
    pub monthly: Option<PeriodView<'a>>,
}

impl<'a> Siblings<'a> {
    pub fn get(&self, period: PeriodType) -> Option<PeriodView<'a>> {
        match period {
            PeriodType::Hourly => self.hourly,
            PeriodType::Daily => self.daily,
            PeriodType::Weekly => self.weekly,
            PeriodType::Monthly => self.monthly,
        }
    }

    pub fn set(&mut self, period: PeriodType, view: Option<PeriodView<'a>>) {
        match period {
            PeriodType::Hourly => self.hourly = view,
            PeriodType::Daily => self.daily = view,
            PeriodType::Weekly => self.weekly = view,
            PeriodType::Monthly => self.monthly = view,
        }
    }

    pub fn present(&self) -> Vec<PeriodType> {
        PeriodType::ALL
            .into_iter()
            .filter(|p| self.get(*p).is_some())
            .collect()
    }

    fn dominant_narrative_id(&self, period: PeriodType) -> Option<&'a str> {
        self.get(period)
            .and_then(|view| view.state.dominant_narrative())
            .map(|n| n.id.as_str())
    }
}

/// Weights after the safety rails
#[derive(Debug, Clone, PartialEq)]
pub struct WeightDecision {
    pub weights_applied: PeriodWeights,
    pub effective_weights: PeriodWeights,
    pub fallback_applied: bool,
    pub override_reason: Option<String>,
}

fn hourly_override(hourly: Option<&ObservedState>) -> Option<String> {
    let state = hourly?;
    let fastest = state
        .narratives
        .iter()
        .filter(|n| n.velocity.magnitude >= OVERRIDE_VELOCITY)
        .max_by(|a, b| a.velocity.magnitude.total_cmp(&b.velocity.magnitude))?;
    let label = if fastest.label.is_empty() {
        fastest.id.as_str()
    } else {
        fastest.label.as_str()
    };
    Some(format!(
        "Extreme hourly velocity on '{}' (magnitude {:.2} >= {:.1})",
        label, fastest.velocity.magnitude, OVERRIDE_VELOCITY
    ))
}

/// Apply the safety rails to the lens's base weights
pub fn effective_weights(
    lens: DecisionLens,
    hourly: Option<&ObservedState>,
    present: &[PeriodType],
) -> WeightDecision {
    apply_rails(lens.base_weights(), lens.is_strategic(), hourly, present)
}

/// Cap hourly, drop it for strategic lenses without an override, renormalize
///
/// The cap applies before renormalization, so the final hourly share can
/// end up above [`HOURLY_WEIGHT_CAP`]. When every weight is zero, the weight
/// is spread uniformly over the periods in `present` (all four if none) and
/// `fallback_applied` is set.
pub fn apply_rails(
    base: PeriodWeights,
    strategic: bool,
    hourly: Option<&ObservedState>,
    present: &[PeriodType],
) -> WeightDecision {
    let mut weights = base;
    weights.hourly = base.hourly.min(HOURLY_WEIGHT_CAP);

    let mut override_reason = None;
    if strategic {
        override_reason = hourly_override(hourly);
        if override_reason.is_none() {
            weights.hourly = 0.0;
        }
    }

    let sum = weights.sum();
    let mut fallback_applied = false;
    if sum > 0.0 {
        for period in PeriodType::ALL {
            weights.set(period, weights.get(period) / sum);
        }
    } else {
        let targets: Vec<PeriodType> = if present.is_empty() {
            PeriodType::ALL.to_vec()
        } else {
            present.to_vec()
        };
        let share = 1.0 / targets.len() as f64;
        weights = PeriodWeights::default();
        for period in targets {
            weights.set(period, share);
        }
        fallback_applied = true;
        tracing::warn!("All temporal weights were zero, using uniform weights");
    }

    WeightDecision {
        weights_applied: base,
        effective_weights: weights,
        fallback_applied,
        override_reason,
    }
}

/// Agreement of the hourly, weekly and monthly dominant narratives
///
/// High needs all three present and equal. Low needs all three present and
/// pairwise distinct. Anything else, including a missing period, is moderate.
pub fn temporal_consistency(siblings: &Siblings<'_>) -> TemporalConsistency {
    let hourly = siblings.dominant_narrative_id(PeriodType::Hourly);
    let weekly = siblings.dominant_narrative_id(PeriodType::Weekly);
    let monthly = siblings.dominant_narrative_id(PeriodType::Monthly);

    match (hourly, weekly, monthly) {
        (Some(h), Some(w), Some(m)) if h == w && w == m => TemporalConsistency::High,
        (Some(h), Some(w), Some(m)) if h != w && w != m && h != m => TemporalConsistency::Low,
        _ => TemporalConsistency::Moderate,
    }
}

fn freshness(siblings: &Siblings<'_>, now: DateTime<Utc>) -> DataFreshness {
    let entry = |period| {
        siblings.get(period).map(|view: PeriodView<'_>| PeriodFreshness {
            snapshot_start: view.snapshot_start,
            age_hours: round_to((now - view.snapshot_start).num_minutes() as f64 / 60.0, 1),
        })
    };
    DataFreshness {
        hourly: entry(PeriodType::Hourly),
        daily: entry(PeriodType::Daily),
        weekly: entry(PeriodType::Weekly),
        monthly: entry(PeriodType::Monthly),
    }
}

/// Fuse the sibling snapshots into a weighted composite
pub fn fuse(
    lens: DecisionLens,
    siblings: &Siblings<'_>,
    persistence: &[NarrativePersistence],
    now: DateTime<Utc>,
) -> TemporalComposite {
    let present = siblings.present();
    let decision = effective_weights(lens, siblings.hourly.map(|v| v.state), &present);
    let weights = decision.effective_weights;

    let mut narratives: Vec<CompositeNarrative> = Vec::new();
    let mut narrative_index: HashMap<String, usize> = HashMap::new();
    let mut emotions: Vec<CompositeEmotion> = Vec::new();
    let mut emotion_index: HashMap<String, usize> = HashMap::new();

    for period in &present {
        let Some(view) = siblings.get(*period) else {
            continue;
        };
        let weight = weights.get(*period);

        for n in &view.state.narratives {
            let idx = *narrative_index.entry(n.id.clone()).or_insert_with(|| {
                narratives.push(CompositeNarrative {
                    id: n.id.clone(),
                    label: n.label.clone(),
                    weighted_score: 0.0,
                    periods: Vec::new(),
                });
                narratives.len() - 1
            });
            narratives[idx].weighted_score += n.prevalence_pct * weight;
            narratives[idx].periods.push(*period);
        }

        for e in &view.state.emotions {
            let idx = *emotion_index.entry(e.emotion.clone()).or_insert_with(|| {
                emotions.push(CompositeEmotion {
                    emotion: e.emotion.clone(),
                    weighted_intensity: 0.0,
                    periods: Vec::new(),
                });
                emotions.len() - 1
            });
            emotions[idx].weighted_intensity += e.intensity * weight;
            emotions[idx].periods.push(*period);
        }
    }

    narratives.sort_by(|a, b| b.weighted_score.total_cmp(&a.weighted_score));
    narratives.truncate(MAX_COMPOSITE_NARRATIVES);
    for n in &mut narratives {
        n.weighted_score = round_to(n.weighted_score, 2);
    }
    emotions.sort_by(|a, b| b.weighted_intensity.total_cmp(&a.weighted_intensity));
    emotions.truncate(MAX_COMPOSITE_EMOTIONS);
    for e in &mut emotions {
        e.weighted_intensity = round_to(e.weighted_intensity, 2);
    }

    let consistency = temporal_consistency(siblings);

    let structural = persistence
        .iter()
        .filter(|p| p.classification == PersistenceClass::Structural)
        .count();
    let narrative_persistence_ratio = if persistence.is_empty() {
        0.0
    } else {
        round_to(structural as f64 / persistence.len() as f64, 2)
    };

    let direction = |period| {
        siblings
            .get(period)
            .and_then(|v: PeriodView<'_>| v.state.dominant_narrative())
            .map(|n| n.velocity.direction)
    };
    let velocity_alignment = match (direction(PeriodType::Weekly), direction(PeriodType::Monthly)) {
        (Some(weekly), Some(monthly)) => weekly == monthly,
        _ => false,
    };

    TemporalComposite {
        decision_lens: lens,
        narratives,
        emotions,
        temporal_consistency: consistency,
        stability_score: consistency.stability_score(),
        attribution: TemporalAttribution {
            weights_applied: decision.weights_applied,
            effective_weights: decision.effective_weights,
            fallback_applied: decision.fallback_applied,
            data_freshness: freshness(siblings, now),
            confidence_basis: ConfidenceBasis {
                timeframe_agreement: consistency,
                narrative_persistence_ratio,
                velocity_alignment,
                hourly_override_active: decision.override_reason.is_some(),
                hourly_override_reason: decision.override_reason,
            },
        },
    }
}

/// Classify how persistently each narrative appears in recent daily snapshots
///
/// `daily_history` is ordered most recent first; only the first
/// [`PERSISTENCE_LOOKBACK_DAYS`] entries are scanned.
pub fn narrative_persistence(
    narrative_ids: &[String],
    daily_history: &[Snapshot],
) -> Vec<NarrativePersistence> {
    let scanned = &daily_history[..daily_history.len().min(PERSISTENCE_LOOKBACK_DAYS)];

    narrative_ids
        .iter()
        .map(|id| {
            let hits: Vec<&Snapshot> = scanned
                .iter()
                .filter(|s| s.observed_state.narrative(id).is_some())
                .collect();
            let weekly_hits = scanned
                .iter()
                .take(7)
                .filter(|s| s.observed_state.narrative(id).is_some())
                .count();

            let weekly_presence_pct = round_to(weekly_hits as f64 / 7.0 * 100.0, 1);
            let monthly_presence_pct = if scanned.is_empty() {
                0.0
            } else {
                round_to(hits.len() as f64 / scanned.len() as f64 * 100.0, 1)
            };
            let first_seen_date: Option<NaiveDate> =
                hits.iter().map(|s| s.snapshot_start.date_naive()).min();

            NarrativePersistence {
                narrative_id: id.clone(),
                weekly_presence_pct,
                monthly_presence_pct,
                classification: classify(weekly_presence_pct, monthly_presence_pct),
                first_seen_date,
                days_active: hits.len() as u32,
            }
        })
        .collect()
}

pub fn classify(weekly_presence_pct: f64, monthly_presence_pct: f64) -> PersistenceClass {
    if monthly_presence_pct >= 70.0 {
        PersistenceClass::Structural
    } else if monthly_presence_pct <= 30.0 && weekly_presence_pct <= 40.0 {
        PersistenceClass::EventDriven
    } else {
        PersistenceClass::Emerging
    }
}
