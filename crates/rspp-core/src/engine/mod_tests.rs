// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Mutex;
use std::time::Duration;

use super::*;
use crate::model::{EdgeSpec, NodeSpec};
use crate::plan_resolver::{PlanIdentity, PlanRequest, PolicyOverrides, ProfileRegistry};
use crate::model::{AdaptiveAction, SnapshotProvenance};

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

fn resolved_plan(turn_id: &str, authority_epoch: u64) -> ResolvedTurnPlan {
    let req = PlanRequest {
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
    };
    crate::plan_resolver::resolve(&req, &ProfileRegistry::with_defaults()).unwrap()
}

fn node(id: &str, lane: Lane) -> NodeSpec {
    NodeSpec {
        node_id: id.to_string(),
        node_type: "llm".to_string(),
        lane,
        provider: None,
        shed: false,
        reason: None,
        allow_degrade: false,
        allow_fallback: false,
        concurrency_limit: 0,
        fairness_key: None,
    }
}

fn scheduling_input(resolved_turn_plan: Option<ResolvedTurnPlan>) -> SchedulingInput {
    SchedulingInput {
        session_id: "sess-1".to_string(),
        turn_id: "turn-1".to_string(),
        event_id: "evt-1".to_string(),
        pipeline_version: "pipeline-v1".to_string(),
        authority_epoch: 5,
        resolved_turn_plan,
    }
}

/// A runner that returns a scripted outcome keyed by node id, defaulting to
/// success for any node without a script entry; records dispatch order.
struct ScriptedRunner {
    outcomes: std::collections::HashMap<String, Outcome>,
    order: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    fn new(outcomes: std::collections::HashMap<String, Outcome>) -> Self {
        Self { outcomes, order: Mutex::new(Vec::new()) }
    }

    fn all_success() -> Self {
        Self::new(std::collections::HashMap::new())
    }

    fn order(&self) -> Vec<String> {
        self.order.lock().unwrap_or_else(|poison| poison.into_inner()).clone()
    }
}

impl NodeRunner for ScriptedRunner {
    fn run_node<'a>(&'a self, node: &'a NodeSpec, _ctx: &'a NodeRunContext) -> BoxedOutcomeFuture<'a> {
        self.order.lock().unwrap_or_else(|poison| poison.into_inner()).push(node.node_id.clone());
        let outcome = self.outcomes.get(&node.node_id).cloned().unwrap_or_else(|| Outcome::success("ok"));
        Box::pin(async move { outcome })
    }
}

#[tokio::test]
async fn topological_regime_runs_every_node_to_completion_in_lane_order() {
    let plan = ExecutionPlan {
        nodes: vec![node("stt", Lane::Data), node("telemetry-1", Lane::Telemetry), node("control-1", Lane::Control)],
        edges: vec![],
    };
    let pool = pool::ExecutionPool::new(8);
    let runner = ScriptedRunner::all_success();
    let input = scheduling_input(None);

    let trace = run_plan(&plan, &input, &pool, &runner, Duration::from_millis(500)).await.unwrap();

    assert!(trace.completed);
    assert_eq!(trace.dispatched, vec!["control-1", "stt", "telemetry-1"]);
    assert_eq!(runner.order(), vec!["control-1", "stt", "telemetry-1"]);
}

#[tokio::test]
async fn lane_scheduler_regime_runs_through_resolved_plan_queues() {
    let plan = ExecutionPlan { nodes: vec![node("a", Lane::Data), node("b", Lane::Control)], edges: vec![] };
    let pool = pool::ExecutionPool::new(8);
    let runner = ScriptedRunner::all_success();
    let resolved = resolved_plan("turn-1", 5);
    let input = scheduling_input(Some(resolved));

    let trace = run_plan(&plan, &input, &pool, &runner, Duration::from_millis(500)).await.unwrap();

    assert!(trace.completed);
    assert_eq!(trace.dispatched, vec!["b", "a"]);
}

#[tokio::test]
async fn non_terminal_failure_path_continues_after_degrade_signal() {
    let mut outcomes = std::collections::HashMap::new();
    outcomes.insert("a".to_string(), Outcome::infrastructure_failure("boom"));
    let mut first = node("a", Lane::Data);
    first.allow_degrade = true;
    let plan = ExecutionPlan { nodes: vec![first, node("b", Lane::Data)], edges: vec![EdgeSpec { from: "a".into(), to: "b".into() }] };
    let pool = pool::ExecutionPool::new(8);
    let runner = ScriptedRunner::new(outcomes);
    let input = scheduling_input(None);

    let trace = run_plan(&plan, &input, &pool, &runner, Duration::from_millis(500)).await.unwrap();

    assert!(trace.completed);
    assert!(trace.signals.iter().any(|s| s.signal == "degrade"));
    assert_eq!(trace.dispatched, vec!["a", "b"]);
}

#[tokio::test]
async fn terminal_failure_stops_the_trace_before_downstream_nodes() {
    let mut outcomes = std::collections::HashMap::new();
    outcomes.insert("a".to_string(), Outcome::infrastructure_failure("boom"));
    let plan = ExecutionPlan {
        nodes: vec![node("a", Lane::Data), node("b", Lane::Data)],
        edges: vec![EdgeSpec { from: "a".into(), to: "b".into() }],
    };
    let pool = pool::ExecutionPool::new(8);
    let runner = ScriptedRunner::new(outcomes);
    let input = scheduling_input(None);

    let trace = run_plan(&plan, &input, &pool, &runner, Duration::from_millis(500)).await.unwrap();

    assert!(!trace.completed);
    assert_eq!(trace.terminal_reason.as_deref(), Some("node_timeout_or_failure"));
    assert_eq!(trace.dispatched, vec!["a"]);
    assert!(!runner.order().contains(&"b".to_string()));
}

#[tokio::test]
async fn shed_node_in_telemetry_lane_is_non_terminal() {
    let mut telemetry = node("t", Lane::Telemetry);
    telemetry.shed = true;
    let plan = ExecutionPlan { nodes: vec![telemetry, node("b", Lane::Data)], edges: vec![] };
    let pool = pool::ExecutionPool::new(8);
    let runner = ScriptedRunner::all_success();
    let input = scheduling_input(None);

    let trace = run_plan(&plan, &input, &pool, &runner, Duration::from_millis(500)).await.unwrap();

    assert!(trace.completed);
    assert_eq!(runner.order(), vec!["b"]);
    assert!(trace.signals.iter().any(|s| s.signal == "shed"));
}

#[tokio::test]
async fn shed_node_in_data_lane_is_terminal() {
    let mut data = node("d", Lane::Data);
    data.shed = true;
    let plan = ExecutionPlan { nodes: vec![data, node("b", Lane::Data)], edges: vec![] };
    let pool = pool::ExecutionPool::new(8);
    let runner = ScriptedRunner::all_success();
    let input = scheduling_input(None);

    let trace = run_plan(&plan, &input, &pool, &runner, Duration::from_millis(500)).await.unwrap();

    assert!(!trace.completed);
    assert_eq!(trace.terminal_reason.as_deref(), Some("scheduling_point_shed"));
}

#[tokio::test]
async fn hook_timeout_is_surfaced_as_timeout_outcome() {
    struct SlowRunner;
    impl NodeRunner for SlowRunner {
        fn run_node<'a>(&'a self, _node: &'a NodeSpec, _ctx: &'a NodeRunContext) -> BoxedOutcomeFuture<'a> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Outcome::success("too late")
            })
        }
    }
    let plan = ExecutionPlan { nodes: vec![node("slow", Lane::Data)], edges: vec![] };
    let pool = pool::ExecutionPool::new(8);
    let runner = SlowRunner;
    let input = scheduling_input(None);

    let trace = run_plan(&plan, &input, &pool, &runner, Duration::from_millis(10)).await.unwrap();

    assert!(!trace.completed);
    let (_, outcome) = trace.outcomes.iter().find(|(id, _)| id == "slow").unwrap();
    assert_eq!(outcome.class, OutcomeClass::Timeout);
}

#[tokio::test]
async fn mismatched_resolved_plan_identity_errors() {
    let plan = ExecutionPlan { nodes: vec![node("a", Lane::Data)], edges: vec![] };
    let pool = pool::ExecutionPool::new(8);
    let runner = ScriptedRunner::all_success();
    let resolved = resolved_plan("different-turn", 5);
    let input = scheduling_input(Some(resolved));

    let err = run_plan(&plan, &input, &pool, &runner, Duration::from_millis(500)).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidIdentity { .. }));
}

#[tokio::test]
async fn pool_rejection_on_telemetry_lane_is_non_terminal() {
    let pool = pool::ExecutionPool::new(4);
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    pool.submit(pool::PoolTask::new("heavy-1", Some("heavy".into()), 1, async move {
        let _ = rx.await;
    }))
    .await
    .unwrap();
    tokio::task::yield_now().await;

    let mut telemetry = node("t", Lane::Telemetry);
    telemetry.fairness_key = Some("heavy".into());
    telemetry.concurrency_limit = 1;
    let plan = ExecutionPlan { nodes: vec![telemetry, node("b", Lane::Data)], edges: vec![] };
    let runner = ScriptedRunner::all_success();
    let input = scheduling_input(None);

    let trace = run_plan(&plan, &input, &pool, &runner, Duration::from_millis(500)).await.unwrap();

    assert!(trace.completed);
    assert!(trace.terminal_reason.is_none());
    assert_eq!(runner.order(), vec!["b"]);
    assert!(trace.signals.iter().any(|s| s.signal == "shed" && s.reason.contains("node_concurrency_limited")));

    let _ = tx.send(());
    pool.drain(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn pool_rejection_on_data_lane_is_terminal() {
    let pool = pool::ExecutionPool::new(4);
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    pool.submit(pool::PoolTask::new("heavy-1", Some("heavy".into()), 1, async move {
        let _ = rx.await;
    }))
    .await
    .unwrap();
    tokio::task::yield_now().await;

    let mut data = node("d", Lane::Data);
    data.fairness_key = Some("heavy".into());
    data.concurrency_limit = 1;
    let plan = ExecutionPlan { nodes: vec![data], edges: vec![] };
    let runner = ScriptedRunner::all_success();
    let input = scheduling_input(None);

    let trace = run_plan(&plan, &input, &pool, &runner, Duration::from_millis(500)).await.unwrap();

    assert!(!trace.completed);
    assert_eq!(trace.terminal_reason.as_deref(), Some("node_concurrency_limited"));
    assert!(runner.order().is_empty());

    let _ = tx.send(());
    pool.drain(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn invalid_execution_plan_rejected_before_dispatch() {
    let plan = ExecutionPlan { nodes: vec![], edges: vec![] };
    let pool = pool::ExecutionPool::new(8);
    let runner = ScriptedRunner::all_success();
    let input = scheduling_input(None);

    let err = run_plan(&plan, &input, &pool, &runner, Duration::from_millis(500)).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidExecutionPlan { .. }));
}

