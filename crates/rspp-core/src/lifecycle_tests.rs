// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::admission::CapacityDisposition;
use crate::model::{AdaptiveAction, SnapshotProvenance};
use crate::plan_resolver::{PlanIdentity, PolicyOverrides};
use crate::testkit::FakeLeaseBackend;

fn provenance() -> SnapshotProvenance {
    SnapshotProvenance {
        routing_view_ref: "rv-1".into(),
        admission_policy_ref: "ap-1".into(),
        abi_compatibility_ref: "abi-1".into(),
        version_resolution_ref: "vr-1".into(),
        policy_resolution_ref: "pr-1".into(),
        provider_health_ref: "ph-1".into(),
    }
}

fn plan_request(turn_id: &str, authority_epoch: u64) -> PlanRequest {
    PlanRequest {
        identity: PlanIdentity {
            turn_id: turn_id.to_string(),
            pipeline_version: "pipeline-v1".into(),
            graph_definition_ref: "graph-1".into(),
            authority_epoch,
        },
        execution_profile: "simple".into(),
        snapshot_provenance: provenance(),
        allowed_adaptive_actions: vec![AdaptiveAction::Retry],
        overrides: PolicyOverrides::default(),
        determinism_seed: 1,
        ordering_markers: vec!["m1".into()],
        merge_rule_id: "mr-1".into(),
        merge_rule_version: "v1.0".into(),
        streaming_handoff: None,
        inject_materialization_failure: false,
    }
}

fn open_request(turn_id: &str, authority_epoch: u64) -> OpenRequest {
    OpenRequest {
        session_id: "sess-1".to_string(),
        turn_id: turn_id.to_string(),
        event_id: "evt-1".to_string(),
        claimed_authority_epoch: authority_epoch,
        snapshot_valid: true,
        snapshot_failure_policy: SnapshotFailurePolicy::Defer,
        capacity_disposition: CapacityDisposition::Allow,
        plan_request: plan_request(turn_id, authority_epoch),
    }
}

#[tokio::test]
async fn handle_turn_open_admits_and_materializes_plan() {
    let lifecycle = Lifecycle::new("sess-1", ProfileRegistry::with_defaults());
    let backend = FakeLeaseBackend::authorized(5);

    let result = lifecycle.handle_turn_open(&backend, open_request("turn-1", 5)).await.unwrap();

    assert_eq!(result.state, TurnState::Opening);
    assert_eq!(result.outcome.kind, OutcomeKind::Admit);
    assert!(result.plan.is_some());
    assert_eq!(result.lifecycle_event.unwrap().name, "turn_open");
}

#[tokio::test]
async fn handle_turn_open_rejects_stale_epoch_without_opening() {
    let lifecycle = Lifecycle::new("sess-1", ProfileRegistry::with_defaults());
    let backend = FakeLeaseBackend::stale_epoch(5, 9);

    let result = lifecycle.handle_turn_open(&backend, open_request("turn-1", 5)).await.unwrap();

    assert_eq!(result.state, TurnState::Idle);
    assert_eq!(result.outcome.kind, OutcomeKind::StaleEpochReject);
    assert!(result.plan.is_none());
}

#[tokio::test]
async fn handle_turn_open_rejects_session_mismatch() {
    let lifecycle = Lifecycle::new("sess-1", ProfileRegistry::with_defaults());
    let backend = FakeLeaseBackend::authorized(5);
    let mut req = open_request("turn-1", 5);
    req.session_id = "sess-2".to_string();

    let err = lifecycle.handle_turn_open(&backend, req).await.unwrap_err();
    assert!(matches!(err, CoreError::SessionMismatch { .. }));
}

#[tokio::test]
async fn handle_turn_open_rejects_when_a_turn_is_already_in_flight() {
    let lifecycle = Lifecycle::new("sess-1", ProfileRegistry::with_defaults());
    let backend = FakeLeaseBackend::authorized(5);

    lifecycle.handle_turn_open(&backend, open_request("turn-1", 5)).await.unwrap();
    let err = lifecycle.handle_turn_open(&backend, open_request("turn-2", 5)).await.unwrap_err();
    assert!(matches!(err, CoreError::TurnAlreadyOpen { .. }));
}

#[tokio::test]
async fn materialization_failure_resets_slot_to_idle_for_same_turn_id() {
    let lifecycle = Lifecycle::new("sess-1", ProfileRegistry::with_defaults());
    let backend = FakeLeaseBackend::authorized(5);
    let mut req = open_request("turn-1", 5);
    req.plan_request.inject_materialization_failure = true;

    let err = lifecycle.handle_turn_open(&backend, req).await.unwrap_err();
    assert!(matches!(err, CoreError::MaterializationFailed { .. }));

    let snapshot = lifecycle.snapshot().await;
    assert_eq!(snapshot.state, TurnState::Idle);

    // The slot is free again; a fresh open on the same session succeeds.
    let result = lifecycle.handle_turn_open(&backend, open_request("turn-1", 5)).await.unwrap();
    assert_eq!(result.state, TurnState::Opening);
}

#[tokio::test]
async fn handle_active_commit_emits_commit_then_close() {
    let lifecycle = Lifecycle::new("sess-1", ProfileRegistry::with_defaults());
    let backend = FakeLeaseBackend::authorized(5);
    lifecycle.handle_turn_open(&backend, open_request("turn-1", 5)).await.unwrap();

    let result = lifecycle
        .handle_active(ActiveInput {
            session_id: "sess-1".to_string(),
            turn_id: "turn-1".to_string(),
            terminal_ready: true,
            terminal_trigger: Some(TerminalTrigger::Commit),
            terminal_reason: "turn_complete".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(result.state, TurnState::Closed);
    assert_eq!(result.events.len(), 2);
    assert_eq!(result.events[0].name, "commit");
    assert_eq!(result.events[1].name, "close");
}

#[tokio::test]
async fn handle_active_abort_emits_abort_then_close() {
    let lifecycle = Lifecycle::new("sess-1", ProfileRegistry::with_defaults());
    let backend = FakeLeaseBackend::authorized(5);
    lifecycle.handle_turn_open(&backend, open_request("turn-1", 5)).await.unwrap();

    let result = lifecycle
        .handle_active(ActiveInput {
            session_id: "sess-1".to_string(),
            turn_id: "turn-1".to_string(),
            terminal_ready: true,
            terminal_trigger: Some(TerminalTrigger::Abort),
            terminal_reason: "upstream_cancelled".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(result.state, TurnState::Closed);
    assert_eq!(result.events[0].name, "abort");
}

#[tokio::test]
async fn handle_active_not_terminal_ready_leaves_state_unchanged_with_no_events() {
    let lifecycle = Lifecycle::new("sess-1", ProfileRegistry::with_defaults());
    let backend = FakeLeaseBackend::authorized(5);
    lifecycle.handle_turn_open(&backend, open_request("turn-1", 5)).await.unwrap();

    let result = lifecycle
        .handle_active(ActiveInput {
            session_id: "sess-1".to_string(),
            turn_id: "turn-1".to_string(),
            terminal_ready: false,
            terminal_trigger: None,
            terminal_reason: String::new(),
        })
        .await
        .unwrap();

    assert_eq!(result.state, TurnState::Opening);
    assert!(result.events.is_empty());
}

#[tokio::test]
async fn handle_active_terminal_ready_without_trigger_errors() {
    let lifecycle = Lifecycle::new("sess-1", ProfileRegistry::with_defaults());
    let backend = FakeLeaseBackend::authorized(5);
    lifecycle.handle_turn_open(&backend, open_request("turn-1", 5)).await.unwrap();

    let err = lifecycle
        .handle_active(ActiveInput {
            session_id: "sess-1".to_string(),
            turn_id: "turn-1".to_string(),
            terminal_ready: true,
            terminal_trigger: None,
            terminal_reason: String::new(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidIdentity { .. }));
}

#[tokio::test]
async fn handle_active_unknown_turn_id_errors() {
    let lifecycle = Lifecycle::new("sess-1", ProfileRegistry::with_defaults());
    let backend = FakeLeaseBackend::authorized(5);
    lifecycle.handle_turn_open(&backend, open_request("turn-1", 5)).await.unwrap();

    let err = lifecycle
        .handle_active(ActiveInput {
            session_id: "sess-1".to_string(),
            turn_id: "turn-does-not-exist".to_string(),
            terminal_ready: true,
            terminal_trigger: Some(TerminalTrigger::Commit),
            terminal_reason: String::new(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidIdentity { .. }));
}

#[tokio::test]
async fn snapshot_reflects_bound_plan_hash_once_open() {
    let lifecycle = Lifecycle::new("sess-1", ProfileRegistry::with_defaults());
    let backend = FakeLeaseBackend::authorized(5);
    let result = lifecycle.handle_turn_open(&backend, open_request("turn-1", 5)).await.unwrap();

    let snapshot = lifecycle.snapshot().await;
    assert_eq!(snapshot.turn_id, "turn-1");
    assert_eq!(snapshot.plan_hash, result.plan.map(|p| p.plan_hash));
}
