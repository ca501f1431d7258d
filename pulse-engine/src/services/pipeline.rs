//! Snapshot pipeline for one (symbol, period, window) unit
//!
//! Shared by the scheduled orchestrator and the backfill streamer:
//! prior snapshot, messages, extraction, metrics, fusion, interpretation,
//! upsert. A unit never panics or aborts its batch; every path ends in a
//! [`UnitOutcome`].

use chrono::{DateTime, Utc};
use pulse_common::Clock;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::db::snapshots;
use crate::models::message::{qualifying_messages, unique_authors, RawMessage};
use crate::models::observed::{
    canonical_emotion, EmotionState, NarrativeState, ObservedState, Volatility,
};
use crate::models::snapshot::{PeriodType, Snapshot, SnapshotWindow, INTERPRETATION_VERSION};
use crate::models::temporal::DecisionLens;
use crate::models::Interpretation;
use crate::resilience::{guarded_call, upstreams, CircuitBreaker, RetryPolicy, UpstreamError};

use super::collaborators::{
    Collaborators, ExtractionRequest, ExtractionResult, InterpretationRequest,
};
use super::interpretation::interpret_with_fallback;
use super::signal_metrics::{self, round_to};
use super::temporal_fusion::{self, PeriodView, Siblings, PERSISTENCE_LOOKBACK_DAYS};

/// Fewer qualifying messages than this and the unit is skipped
pub const MIN_QUALIFYING_MESSAGES: usize = 5;
pub const INSUFFICIENT_MESSAGES: &str = "Insufficient messages";

/// How one unit ended
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    Created(Box<Snapshot>),
    Skipped { reason: String, message_count: u32 },
    Failed { error: String },
}

#[derive(Clone)]
pub struct SnapshotPipeline {
    db: SqlitePool,
    collaborators: Collaborators,
    breaker: CircuitBreaker,
    clock: Arc<dyn Clock>,
    decision_lens: DecisionLens,
    retry: RetryPolicy,
}

impl SnapshotPipeline {
    pub fn new(
        db: SqlitePool,
        collaborators: Collaborators,
        breaker: CircuitBreaker,
        clock: Arc<dyn Clock>,
        decision_lens: DecisionLens,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            collaborators,
            breaker,
            clock,
            decision_lens,
            retry,
        }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    async fn call_collaborator<T, F, Fut>(&self, upstream: &str, call: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, UpstreamError>>,
    {
        guarded_call(&self.breaker, upstream, &self.retry, UpstreamError::is_retryable, call).await
    }

    /// Build and store the snapshot for `window`
    ///
    /// `created_at` is the wall clock for live runs and the window end for
    /// backfilled history.
    pub async fn process(
        &self,
        symbol: &str,
        period: PeriodType,
        window: SnapshotWindow,
        created_at: DateTime<Utc>,
    ) -> UnitOutcome {
        match self.try_process(symbol, period, window, created_at).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(symbol, period = %period, error = %error, "Snapshot unit failed");
                UnitOutcome::Failed { error }
            }
        }
    }

    async fn try_process(
        &self,
        symbol: &str,
        period: PeriodType,
        window: SnapshotWindow,
        created_at: DateTime<Utc>,
    ) -> Result<UnitOutcome, String> {
        let prior = snapshots::latest_before(&self.db, symbol, period, window.start)
            .await
            .map_err(|e| format!("Loading prior snapshot failed: {}", e))?;
        let prior_state = prior.as_ref().map(|s| &s.observed_state);

        let messages = self
            .call_collaborator(upstreams::MESSAGES, || {
                self.collaborators.messages.fetch_messages(symbol, &window)
            })
            .await
            .map_err(|e| format!("Fetching messages failed: {}", e))?;

        let qualifying = qualifying_messages(messages, &window);
        let message_count = qualifying.len() as u32;
        if qualifying.len() < MIN_QUALIFYING_MESSAGES {
            info!(symbol, period = %period, message_count, "Skipping: insufficient messages");
            return Ok(UnitOutcome::Skipped {
                reason: INSUFFICIENT_MESSAGES.to_string(),
                message_count,
            });
        }

        let request = ExtractionRequest::new(symbol, period, &qualifying, prior_state);
        let extracted = self
            .call_collaborator(upstreams::EXTRACTION, || {
                self.collaborators.extraction.extract(&request)
            })
            .await
            .map_err(|e| format!("Extraction failed: {}", e))?;

        let authors = unique_authors(&qualifying);
        let mut observed = derive_observed_state(extracted, prior_state, &qualifying);
        observed.confidence =
            signal_metrics::confidence(message_count, authors, observed.narratives.len(), prior_state);

        let mut snapshot = Snapshot {
            symbol: symbol.to_string(),
            period_type: period,
            snapshot_start: window.start,
            snapshot_end: window.end,
            message_count,
            unique_authors: authors,
            data_confidence: observed.confidence.score,
            observed_state: observed,
            interpretation: Interpretation::default(),
            created_at,
            interpretation_version: INTERPRETATION_VERSION,
        };

        let sibling_rows = self
            .load_siblings(symbol, period, window)
            .await
            .map_err(|e| format!("Loading sibling snapshots failed: {}", e))?;
        let mut history = snapshots::recent_daily(
            &self.db,
            symbol,
            window.end,
            PERSISTENCE_LOOKBACK_DAYS as u32,
        )
        .await
        .map_err(|e| format!("Loading daily history failed: {}", e))?;
        if period == PeriodType::Daily {
            history.retain(|s| s.snapshot_start != window.start);
            history.insert(0, snapshot.clone());
            history.truncate(PERSISTENCE_LOOKBACK_DAYS);
        }

        let mut siblings = Siblings::default();
        for row in &sibling_rows {
            siblings.set(row.period_type, Some(PeriodView::from(row)));
        }
        siblings.set(period, Some(PeriodView::from(&snapshot)));

        let narrative_ids: Vec<String> = snapshot
            .observed_state
            .narratives
            .iter()
            .map(|n| n.id.clone())
            .collect();
        let persistence = temporal_fusion::narrative_persistence(&narrative_ids, &history);
        let composite = temporal_fusion::fuse(self.decision_lens, &siblings, &persistence, created_at);

        let request = InterpretationRequest {
            symbol: symbol.to_string(),
            period_type: period,
            decision_lens: self.decision_lens,
            observed_state: snapshot.observed_state.clone(),
            temporal: composite,
            narrative_persistence: persistence,
        };
        snapshot.interpretation = interpret_with_fallback(
            self.collaborators.interpretation.as_ref(),
            &self.breaker,
            &self.retry,
            &request,
        )
        .await;

        snapshots::upsert_snapshot(&self.db, &snapshot)
            .await
            .map_err(|e| format!("Saving snapshot failed: {}", e))?;

        info!(
            symbol,
            period = %period,
            start = %snapshot.snapshot_start,
            message_count,
            confidence = snapshot.data_confidence,
            "Snapshot stored"
        );
        Ok(UnitOutcome::Created(Box::new(snapshot)))
    }

    /// Most recent snapshot of every other period ending no later than this window
    async fn load_siblings(
        &self,
        symbol: &str,
        period: PeriodType,
        window: SnapshotWindow,
    ) -> pulse_common::Result<Vec<Snapshot>> {
        let mut rows = Vec::new();
        for other in PeriodType::ALL.into_iter().filter(|p| *p != period) {
            if let Some(row) = snapshots::latest_before(&self.db, symbol, other, window.end).await? {
                rows.push(row);
            }
        }
        debug!(symbol, siblings = rows.len(), "Loaded sibling snapshots");
        Ok(rows)
    }
}

fn slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

fn change_vs_prior(current: f64, prior_state: Option<&ObservedState>, prior_value: Option<f64>) -> f64 {
    match (prior_state, prior_value) {
        (None, _) => 0.0,
        (Some(_), Some(before)) => round_to(current - before, 2),
        (Some(_), None) => round_to(current, 2),
    }
}

/// Turn a raw extraction into a sanitized observed state with metrics
///
/// Ids are slugged and deduplicated, emotions outside the vocabulary are
/// dropped, and every value is clamped to its documented range.
pub fn derive_observed_state(
    extracted: ExtractionResult,
    prior: Option<&ObservedState>,
    messages: &[RawMessage],
) -> ObservedState {
    let mut seen = HashSet::new();
    let mut narratives = Vec::new();
    for raw in extracted.narratives {
        let id = slug(if raw.id.trim().is_empty() { &raw.label } else { &raw.id });
        if id.is_empty() || !seen.insert(id.clone()) {
            continue;
        }
        let prevalence_pct = round_to(raw.prevalence_pct.clamp(0.0, 100.0), 2);
        let prior_narrative = prior.and_then(|p| p.narrative(&id));
        let change = change_vs_prior(prevalence_pct, prior, prior_narrative.map(|n| n.prevalence_pct));
        narratives.push(NarrativeState {
            label: if raw.label.trim().is_empty() { id.clone() } else { raw.label.trim().to_string() },
            prevalence_pct,
            change_vs_prior: change,
            velocity: signal_metrics::velocity(change, prior_narrative.map(|n| n.change_vs_prior)),
            sentiment_skew: raw.sentiment_skew.clamp(-1.0, 1.0),
            dominant_emotions: raw
                .dominant_emotions
                .iter()
                .filter_map(|e| canonical_emotion(e).map(|(name, _)| name.to_string()))
                .collect(),
            co_occurring_narratives: raw.co_occurring_narratives.iter().map(|n| slug(n)).collect(),
            confidence: raw.confidence.clamp(0.0, 1.0),
            id,
        });
    }

    let mut emotions: Vec<EmotionState> = Vec::new();
    for raw in extracted.emotions {
        let Some((name, default_polarity)) = canonical_emotion(&raw.emotion) else {
            debug!(emotion = %raw.emotion, "Dropping emotion outside vocabulary");
            continue;
        };
        let intensity = round_to(raw.intensity.clamp(0.0, 100.0), 2);
        if let Some(existing) = emotions.iter_mut().find(|e| e.emotion == name) {
            existing.intensity = existing.intensity.max(intensity);
            continue;
        }
        emotions.push(EmotionState {
            emotion: name.to_string(),
            intensity,
            polarity: raw.polarity.unwrap_or(default_polarity),
            confidence: raw.confidence.clamp(0.0, 1.0),
            ..Default::default()
        });
    }
    for emotion in &mut emotions {
        let prior_emotion = prior.and_then(|p| p.emotion(&emotion.emotion));
        emotion.change_vs_prior =
            change_vs_prior(emotion.intensity, prior, prior_emotion.map(|e| e.intensity));
        emotion.volatility = Volatility::from_change(emotion.change_vs_prior);
        emotion.velocity =
            signal_metrics::velocity(emotion.change_vs_prior, prior_emotion.map(|e| e.change_vs_prior));
    }

    let concentration = signal_metrics::concentration(messages);
    let coherence = signal_metrics::coherence(&narratives, &emotions);
    let mut observed = ObservedState {
        narratives,
        emotions,
        coherence,
        concentration,
        ..Default::default()
    };
    observed.signals = signal_metrics::signals(&observed, prior, &observed.concentration);
    observed.refresh_dominants();
    observed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::observed::{Polarity, VelocityDirection};
    use crate::services::collaborators::{ExtractedEmotion, ExtractedNarrative};

    fn extracted() -> ExtractionResult {
        ExtractionResult {
            narratives: vec![
                ExtractedNarrative {
                    id: "AI Capex".to_string(),
                    label: "AI capex".to_string(),
                    prevalence_pct: 140.0,
                    sentiment_skew: 2.0,
                    dominant_emotions: vec!["greed".to_string(), "boredom".to_string()],
                    ..Default::default()
                },
                ExtractedNarrative {
                    id: "ai-capex".to_string(),
                    label: "duplicate".to_string(),
                    prevalence_pct: 10.0,
                    ..Default::default()
                },
                ExtractedNarrative {
                    id: "".to_string(),
                    label: "China demand".to_string(),
                    prevalence_pct: 20.0,
                    sentiment_skew: -0.4,
                    ..Default::default()
                },
            ],
            emotions: vec![
                ExtractedEmotion {
                    emotion: "FEAR".to_string(),
                    intensity: 40.0,
                    ..Default::default()
                },
                ExtractedEmotion {
                    emotion: "fear".to_string(),
                    intensity: 55.0,
                    ..Default::default()
                },
                ExtractedEmotion {
                    emotion: "Ennui".to_string(),
                    intensity: 90.0,
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn test_sanitizes_extraction() {
        let observed = derive_observed_state(extracted(), None, &[]);

        let ids: Vec<_> = observed.narratives.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["ai-capex", "china-demand"]);
        assert_eq!(observed.narratives[0].prevalence_pct, 100.0);
        assert_eq!(observed.narratives[0].sentiment_skew, 1.0);
        assert_eq!(observed.narratives[0].dominant_emotions, vec!["Greed"]);
        assert_eq!(observed.narratives[0].change_vs_prior, 0.0);
        assert_eq!(observed.narratives[0].velocity.direction, VelocityDirection::Stable);

        assert_eq!(observed.emotions.len(), 1);
        assert_eq!(observed.emotions[0].emotion, "Fear");
        assert_eq!(observed.emotions[0].intensity, 55.0);
        assert_eq!(observed.emotions[0].polarity, Polarity::Bearish);
        assert!(observed.coherence.score > 0);
        assert_eq!(observed.dominant_narrative.as_deref(), Some("ai-capex"));
    }

    #[test]
    fn test_changes_against_prior() {
        let prior = ObservedState {
            narratives: vec![NarrativeState {
                id: "ai-capex".to_string(),
                prevalence_pct: 60.0,
                change_vs_prior: 10.0,
                ..Default::default()
            }],
            emotions: vec![EmotionState {
                emotion: "Fear".to_string(),
                intensity: 20.0,
                ..Default::default()
            }],
            ..Default::default()
        };
        let observed = derive_observed_state(extracted(), Some(&prior), &[]);

        let ai = observed.narrative("ai-capex").unwrap();
        assert_eq!(ai.change_vs_prior, 40.0);
        // (40 - 10) / 10
        assert_eq!(ai.velocity.magnitude, 3.0);
        assert_eq!(ai.velocity.direction, VelocityDirection::Accelerating);

        // New narrative: change is its full prevalence, no prior velocity
        let china = observed.narrative("china-demand").unwrap();
        assert_eq!(china.change_vs_prior, 20.0);
        assert_eq!(china.velocity.direction, VelocityDirection::Stable);

        let fear = observed.emotion("Fear").unwrap();
        assert_eq!(fear.change_vs_prior, 35.0);
        assert_eq!(fear.volatility, Volatility::High);
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("  AI Capex!! "), "ai-capex");
        assert_eq!(slug("--"), "");
        assert_eq!(slug("Fed/Rates"), "fed-rates");
    }
}
