//! Interpretation step: model call with a deterministic heuristic fallback

use std::collections::BTreeMap;

use crate::models::interpretation::{Bias, Interpretation, InterpretationSource, LensOverlay, Readiness};
use crate::models::observed::{ObservedState, RiskLevel};
use crate::models::temporal::{DecisionLens, NarrativePersistence, TemporalComposite};
use crate::resilience::{guarded_call, upstreams, CircuitBreaker, RetryPolicy, UpstreamError};

use super::collaborators::{InterpretationRequest, InterpretationResult, InterpretationService};
use super::signal_metrics::round_to;

/// Mean sentiment skew across narratives, 0 when there are none
pub fn average_skew(observed: &ObservedState) -> f64 {
    if observed.narratives.is_empty() {
        return 0.0;
    }
    observed.narratives.iter().map(|n| n.sentiment_skew).sum::<f64>()
        / observed.narratives.len() as f64
}

fn readiness_for(risk: RiskLevel) -> Readiness {
    match risk {
        RiskLevel::Low => Readiness::Ready,
        RiskLevel::Moderate => Readiness::Monitor,
        RiskLevel::High => Readiness::InsufficientSignal,
    }
}

fn lens_title(lens: DecisionLens) -> &'static str {
    match lens {
        DecisionLens::Earnings => "Earnings",
        DecisionLens::MergersAcquisitions => "M&A",
        DecisionLens::CorporateStrategy => "Corporate strategy",
        DecisionLens::CapitalAllocation => "Capital allocation",
        DecisionLens::ProductLaunch => "Product launch",
        DecisionLens::CrisisManagement => "Crisis management",
        DecisionLens::InvestorRelations => "Investor relations",
        DecisionLens::CompetitivePositioning => "Competitive positioning",
    }
}

/// Summary, bias and overlays derived from the numbers alone
pub fn heuristic_result(observed: &ObservedState) -> InterpretationResult {
    let bias = Bias::from_skew(average_skew(observed));
    let readiness = readiness_for(observed.coherence.risk_level);

    let summary = match observed.dominant_narrative() {
        None => "Not enough narrative data for an interpretation.".to_string(),
        Some(narrative) => {
            let label = if narrative.label.is_empty() {
                narrative.id.as_str()
            } else {
                narrative.label.as_str()
            };
            let emotion = observed
                .dominant_emotion()
                .map(|e| format!(" with {} leading", e.emotion))
                .unwrap_or_default();
            format!(
                "{} bias: '{}' dominates at {:.1}% of discussion{}; coherence {}/100.",
                capitalize(bias.as_str()),
                label,
                narrative.prevalence_pct,
                emotion,
                observed.coherence.score
            )
        }
    };

    let lens_overlays: BTreeMap<String, LensOverlay> = DecisionLens::ALL
        .into_iter()
        .map(|lens| {
            let overlay = match readiness {
                Readiness::Ready => format!(
                    "{}: {} sentiment is coherent enough to act on.",
                    lens_title(lens),
                    bias.as_str()
                ),
                Readiness::Monitor => format!(
                    "{}: {} lean, but signals are mixed; monitor.",
                    lens_title(lens),
                    bias.as_str()
                ),
                Readiness::InsufficientSignal => {
                    format!("{}: signal too fragmented to interpret.", lens_title(lens))
                }
            };
            (lens.as_str().to_string(), LensOverlay { readiness, overlay })
        })
        .collect();

    InterpretationResult {
        summary,
        bias: Some(bias),
        lens_overlays,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Call the interpretation service; fall back to the heuristic on exhausted
/// retries, an open circuit, or an empty/unparseable answer
pub async fn interpret_with_fallback(
    service: &dyn InterpretationService,
    breaker: &CircuitBreaker,
    policy: &RetryPolicy,
    request: &InterpretationRequest,
) -> Interpretation {
    let answer = guarded_call(
        breaker,
        upstreams::INTERPRETATION,
        policy,
        UpstreamError::is_retryable,
        || service.interpret(request),
    )
    .await;

    let (result, source) = match answer {
        Ok(result) if !result.summary.trim().is_empty() => (result, InterpretationSource::Model),
        Ok(_) => {
            tracing::warn!(symbol = %request.symbol, "Interpretation was empty, using heuristic");
            (heuristic_result(&request.observed_state), InterpretationSource::HeuristicFallback)
        }
        Err(err) => {
            tracing::warn!(
                symbol = %request.symbol,
                error = %err,
                "Interpretation unavailable, using heuristic"
            );
            (heuristic_result(&request.observed_state), InterpretationSource::HeuristicFallback)
        }
    };

    assemble(
        result,
        source,
        request.decision_lens,
        &request.observed_state,
        request.temporal.clone(),
        request.narrative_persistence.clone(),
    )
}

fn assemble(
    result: InterpretationResult,
    source: InterpretationSource,
    decision_lens: DecisionLens,
    observed: &ObservedState,
    temporal: TemporalComposite,
    narrative_persistence: Vec<NarrativePersistence>,
) -> Interpretation {
    let bias = result
        .bias
        .unwrap_or_else(|| Bias::from_skew(round_to(average_skew(observed), 4)));
    Interpretation {
        summary: result.summary,
        bias,
        lens_overlays: result.lens_overlays,
        source,
        decision_lens,
        temporal: Some(temporal),
        narrative_persistence,
    }
}
