//! Scheduled-run behavior: skips, failure isolation, run budget, trading hours

mod helpers;

use chrono::{Duration, TimeZone, Utc};
use std::sync::atomic::Ordering;
use std::time::Duration as StdDuration;

use helpers::{test_config, Harness};
use pulse_engine::db::snapshots;
use pulse_engine::models::interpretation::InterpretationSource;
use pulse_engine::models::snapshot::PeriodType;
use pulse_engine::services::pipeline::INSUFFICIENT_MESSAGES;
use pulse_engine::services::SymbolOutcome;

#[tokio::test]
async fn test_four_messages_skip_without_extraction() {
    let h = Harness::with_config(test_config(&["TSLA"]), 4).await;

    let report = h.state.orchestrator.run(PeriodType::Daily, false).await;
    assert_eq!(
        report.results,
        vec![SymbolOutcome::Skipped {
            symbol: "TSLA".to_string(),
            reason: INSUFFICIENT_MESSAGES.to_string(),
            message_count: 4,
        }]
    );
    assert_eq!(h.extraction.calls.load(Ordering::SeqCst), 0);
    assert!(snapshots::latest(&h.state.db, "TSLA", PeriodType::Daily)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_failed_symbol_does_not_stop_run() {
    let h = Harness::new(&["AAPL", "BAD", "MSFT"]).await;
    h.extraction.fail_for("BAD");

    let report = h.state.orchestrator.run(PeriodType::Daily, false).await;
    assert_eq!(report.count("created"), 2);
    assert_eq!(report.count("failed"), 1);
    match &report.results[1] {
        SymbolOutcome::Failed { symbol, error } => {
            assert_eq!(symbol, "BAD");
            assert!(error.contains("Extraction failed"), "{}", error);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    // AAPL once, BAD three attempts, MSFT once
    assert_eq!(h.extraction.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_budget_exhaustion_marks_not_started() {
    let mut config = test_config(&["AAPL", "MSFT", "NVDA", "TSLA"]);
    config.run_budget = StdDuration::from_secs(140);
    let h = Harness::with_config(config, 12).await;
    h.messages.advance_clock_per_call(Duration::seconds(100));

    let report = h.state.orchestrator.run(PeriodType::Daily, false).await;
    assert_eq!(report.count("created"), 2);
    assert_eq!(report.count("not_started"), 2);
    assert_eq!(report.results[2].symbol(), "NVDA");
    assert!(matches!(report.results[3], SymbolOutcome::NotStarted { .. }));
    assert_eq!(h.messages.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_hourly_outside_trading_hours_needs_force() {
    let h = Harness::new(&["AAPL"]).await;
    // Saturday
    h.clock.set(Utc.with_ymd_and_hms(2026, 3, 7, 15, 10, 0).unwrap());

    let report = h.state.orchestrator.run(PeriodType::Hourly, false).await;
    assert!(report.skipped_reason.is_some());
    assert!(report.results.is_empty());
    assert_eq!(h.messages.calls.load(Ordering::SeqCst), 0);

    let report = h.state.orchestrator.run(PeriodType::Hourly, true).await;
    assert_eq!(report.count("created"), 1);
    let window = report.window.unwrap();
    assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 3, 7, 14, 0, 0).unwrap());
}

#[tokio::test]
async fn test_interpretation_outage_uses_heuristic() {
    let h = Harness::new(&["AAPL"]).await;
    h.interpretation.set_available(false);

    let report = h.state.orchestrator.run(PeriodType::Daily, false).await;
    assert_eq!(report.count("created"), 1);

    let snapshot = snapshots::latest(&h.state.db, "AAPL", PeriodType::Daily)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.interpretation.source, InterpretationSource::HeuristicFallback);
    assert!(!snapshot.interpretation.summary.is_empty());
    // Average skew (0.4 - 0.3) / 2 = 0.05: neutral
    assert_eq!(snapshot.interpretation.bias.as_str(), "neutral");
    assert_eq!(snapshot.interpretation.lens_overlays.len(), 8);
    assert_eq!(h.interpretation.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rerun_upserts_and_fuses_siblings() {
    let h = Harness::new(&["AAPL"]).await;
    h.state.orchestrator.run(PeriodType::Weekly, false).await;
    h.state.orchestrator.run(PeriodType::Daily, false).await;
    let first = snapshots::latest(&h.state.db, "AAPL", PeriodType::Daily)
        .await
        .unwrap()
        .unwrap();

    h.clock.advance(Duration::minutes(5));
    h.state.orchestrator.run(PeriodType::Daily, false).await;
    let second = snapshots::latest(&h.state.db, "AAPL", PeriodType::Daily)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.snapshot_start, second.snapshot_start);
    assert!(second.created_at > first.created_at);
    let stored = snapshots::in_range(
        &h.state.db,
        "AAPL",
        PeriodType::Daily,
        first.snapshot_start,
        first.snapshot_end,
    )
    .await
    .unwrap();
    assert_eq!(stored.len(), 1);

    let temporal = second.interpretation.temporal.expect("temporal composite");
    let freshness = &temporal.attribution.data_freshness;
    assert!(freshness.daily.is_some());
    assert!(freshness.weekly.is_some());
    assert!(freshness.hourly.is_none());
    assert_eq!(temporal.narratives[0].id, "ai-capex");
}
