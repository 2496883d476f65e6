// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::lifecycle::LeaseResolveInput;

fn sample_request() -> InvocationRequest {
    InvocationRequest {
        provider_invocation_id: "inv-1".to_string(),
        session_id: "sess-1".to_string(),
        turn_id: Some("turn-1".to_string()),
        event_id: "evt-1".to_string(),
        modality: Modality::Stt,
        provider_id: "prov-a".to_string(),
        attempt: 1,
        retry_budget_remaining: 1,
        allowed_adaptive_actions: Vec::new(),
        pipeline_version: "v1".to_string(),
        authority_epoch: 1,
    }
}

#[tokio::test]
async fn fake_adapter_replays_script_then_repeats_last() {
    let adapter = FakeAdapter::new(
        "prov-a",
        Modality::Stt,
        vec![Outcome::infrastructure_failure("boom"), Outcome::success("ok")],
    );
    let req = sample_request();
    let first = adapter.invoke(&req).await.unwrap();
    let second = adapter.invoke(&req).await.unwrap();
    let third = adapter.invoke(&req).await.unwrap();
    assert!(!first.class.is_success());
    assert!(second.class.is_success());
    assert!(third.class.is_success());
    assert_eq!(adapter.call_count(), 3);
}

#[tokio::test]
async fn fake_adapter_always_succeeds_helper() {
    let adapter = FakeAdapter::always_succeeds("prov-b", Modality::Llm);
    let outcome = adapter.invoke(&sample_request()).await.unwrap();
    assert!(outcome.class.is_success());
}

#[tokio::test]
async fn fake_lease_backend_authorized_reports_valid_epoch() {
    let backend = FakeLeaseBackend::authorized(7);
    let input = LeaseResolveInput {
        session_id: "sess-1".to_string(),
        turn_id: "turn-1".to_string(),
        claimed_authority_epoch: 7,
    };
    let resolution = backend.resolve(&input).await;
    assert_eq!(resolution.authority_epoch, 7);
    assert!(resolution.authority_epoch_valid);
    assert!(resolution.authority_authorized);
}

#[tokio::test]
async fn fake_lease_backend_stale_epoch_reports_invalid() {
    let backend = FakeLeaseBackend::stale_epoch(5, 9);
    let input = LeaseResolveInput {
        session_id: "sess-1".to_string(),
        turn_id: "turn-1".to_string(),
        claimed_authority_epoch: 5,
    };
    let resolution = backend.resolve(&input).await;
    assert!(!resolution.authority_epoch_valid);
    assert!(!resolution.authority_authorized);
}

#[tokio::test]
async fn recording_exporter_captures_records_in_order() {
    let exporter = RecordingDurableExporter::new();
    let a = TimelineRecord::Baseline(crate::model::DecisionOutcome {
        kind: crate::model::OutcomeKind::Admit,
        phase: crate::model::Phase::PreTurn,
        scope: crate::model::Scope::Session,
        emitter: crate::model::Emitter::Rk24,
        session_id: "sess-1".to_string(),
        turn_id: None,
        event_id: "evt-1".to_string(),
        runtime_timestamp_ms: 1,
        wall_clock_ms: 1,
        timestamp_ms: None,
        authority_epoch: Some(1),
        reason: "ok".to_string(),
    });
    exporter.export(&a).await.unwrap();
    assert_eq!(exporter.len(), 1);
}

#[tokio::test]
async fn recording_exporter_failing_after_threshold() {
    let exporter = RecordingDurableExporter::failing_after(1);
    let record = TimelineRecord::Attempt(crate::provider::InvocationAttempt {
        provider_id: "prov-a".to_string(),
        attempt: 1,
        latency_ms: 1,
        outcome: Outcome::success("ok"),
    });
    assert!(exporter.export(&record).await.is_ok());
    assert!(exporter.export(&record).await.is_err());
    assert_eq!(exporter.len(), 2);
}
