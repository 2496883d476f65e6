// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::model::AdaptiveAction;
use crate::testkit::FakeAdapter;

fn controller_with(adapters: Vec<Arc<FakeAdapter>>, config: ControllerConfig) -> ProviderController {
    let mut catalog = CandidateCatalog::new();
    for adapter in adapters {
        catalog.register(Arc::new(super::super::UnaryOnly(adapter)));
    }
    ProviderController::new(catalog, config, crate::telemetry::default_sink())
}

fn base_input(modality: Modality, allowed: Vec<AdaptiveAction>) -> InvocationInput {
    InvocationInput {
        session_id: "sess-1".to_string(),
        turn_id: Some("turn-1".to_string()),
        event_id: "evt-1".to_string(),
        modality,
        preferred_provider: None,
        allowed_adaptive_actions: allowed,
        pipeline_version: "v1".to_string(),
        authority_epoch: 1,
        cancel_requested: false,
        provider_invocation_id: None,
        resolved_provider_plan: None,
    }
}

#[tokio::test]
async fn first_candidate_success_stops_the_cascade() {
    let adapter = Arc::new(FakeAdapter::always_succeeds("prov-a", Modality::Stt));
    let controller = controller_with(vec![Arc::clone(&adapter)], ControllerConfig::default());

    let result = controller.invoke(&base_input(Modality::Stt, vec![])).await;

    assert!(result.outcome.class.is_success());
    assert_eq!(result.selected_provider.as_deref(), Some("prov-a"));
    assert_eq!(result.attempts.len(), 1);
}

#[tokio::test]
async fn cancel_requested_short_circuits_before_any_attempt() {
    let adapter = Arc::new(FakeAdapter::always_succeeds("prov-a", Modality::Stt));
    let controller = controller_with(vec![adapter], ControllerConfig::default());
    let mut input = base_input(Modality::Stt, vec![]);
    input.cancel_requested = true;

    let result = controller.invoke(&input).await;

    assert!(result.outcome.class.is_cancelled());
    assert!(result.attempts.is_empty());
    assert!(result.signals.is_empty());
}

#[tokio::test]
async fn retry_budget_is_exhausted_before_giving_up() {
    let adapter = Arc::new(FakeAdapter::always_fails("prov-a", Modality::Stt, "boom"));
    let mut config = ControllerConfig::default();
    config.max_attempts_per_provider = 3;
    let controller = controller_with(vec![adapter], config);

    let result = controller.invoke(&base_input(Modality::Stt, vec![AdaptiveAction::Retry])).await;

    assert_eq!(result.attempts.len(), 3);
    assert_eq!(result.retry_decision, None);
    assert!(!result.outcome.class.is_success());
}

#[tokio::test]
async fn provider_switch_moves_to_next_candidate_on_exhaustion() {
    let failing = Arc::new(FakeAdapter::always_fails("prov-a", Modality::Stt, "boom"));
    let succeeding = Arc::new(FakeAdapter::always_succeeds("prov-b", Modality::Stt));
    let mut config = ControllerConfig::default();
    config.max_attempts_per_provider = 1;
    let controller = controller_with(vec![failing, succeeding], config);

    let result = controller.invoke(&base_input(Modality::Stt, vec![AdaptiveAction::ProviderSwitch])).await;

    assert!(result.outcome.class.is_success());
    assert_eq!(result.selected_provider.as_deref(), Some("prov-b"));
    assert_eq!(result.retry_decision, Some("provider_switch"));
    assert!(result.signals.iter().any(|s| s.signal == "provider_switch"));
}

#[tokio::test]
async fn no_switch_action_stops_after_first_candidate_exhausts() {
    let failing = Arc::new(FakeAdapter::always_fails("prov-a", Modality::Stt, "boom"));
    let succeeding = Arc::new(FakeAdapter::always_succeeds("prov-b", Modality::Stt));
    let mut config = ControllerConfig::default();
    config.max_attempts_per_provider = 1;
    let controller = controller_with(vec![failing, succeeding], config);

    let result = controller.invoke(&base_input(Modality::Stt, vec![])).await;

    assert!(!result.outcome.class.is_success());
    assert_eq!(result.attempts.len(), 1);
}

#[tokio::test]
async fn max_total_attempts_caps_across_candidates() {
    let a = Arc::new(FakeAdapter::always_fails("prov-a", Modality::Stt, "boom"));
    let b = Arc::new(FakeAdapter::always_fails("prov-b", Modality::Stt, "boom"));
    let mut config = ControllerConfig::default();
    config.max_attempts_per_provider = 5;
    let controller = controller_with(vec![a, b], config);
    let mut input = base_input(Modality::Stt, vec![AdaptiveAction::Retry, AdaptiveAction::ProviderSwitch]);
    input.resolved_provider_plan = Some(ResolvedProviderPlan {
        ordered_candidates: vec!["prov-a".to_string(), "prov-b".to_string()],
        max_attempts_per_provider: None,
        max_total_attempts: Some(2),
        max_total_latency_ms: None,
    });

    let result = controller.invoke(&input).await;

    assert_eq!(result.attempts.len(), 2);
}

#[tokio::test]
async fn resolved_plan_candidate_order_overrides_catalog_ranking() {
    let a = Arc::new(FakeAdapter::always_succeeds("prov-a", Modality::Stt));
    let b = Arc::new(FakeAdapter::always_succeeds("prov-b", Modality::Stt));
    let controller = controller_with(vec![a, b], ControllerConfig::default());
    let mut input = base_input(Modality::Stt, vec![]);
    input.resolved_provider_plan = Some(ResolvedProviderPlan {
        ordered_candidates: vec!["prov-b".to_string()],
        max_attempts_per_provider: None,
        max_total_attempts: None,
        max_total_latency_ms: None,
    });

    let result = controller.invoke(&input).await;

    assert_eq!(result.selected_provider.as_deref(), Some("prov-b"));
    assert_eq!(result.attempts.len(), 1);
}

#[tokio::test]
async fn no_candidate_providers_reports_infrastructure_failure() {
    let controller = controller_with(vec![], ControllerConfig::default());
    let result = controller.invoke(&base_input(Modality::Stt, vec![])).await;
    assert!(!result.outcome.class.is_success());
    assert!(result.attempts.is_empty());
}

#[tokio::test]
async fn emitted_signals_are_sequence_normalized() {
    let failing = Arc::new(FakeAdapter::always_fails("prov-a", Modality::Stt, "boom"));
    let succeeding = Arc::new(FakeAdapter::always_succeeds("prov-b", Modality::Stt));
    let mut config = ControllerConfig::default();
    config.max_attempts_per_provider = 1;
    let controller = controller_with(vec![failing, succeeding], config);

    let result = controller.invoke(&base_input(Modality::Stt, vec![AdaptiveAction::Fallback])).await;

    let mut prev = None;
    for signal in &result.signals {
        if let Some(prev_seq) = prev {
            assert!(signal.sequence.runtime_sequence >= prev_seq);
        }
        prev = Some(signal.sequence.runtime_sequence);
    }
}
