// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution engine (C4): validates and orders an `ExecutionPlan`, dispatches
//! each node through the bounded [`pool::ExecutionPool`], applies
//! [`failure`] shaping to non-success outcomes, and normalizes the
//! resulting control-signal batch before handing the trace back.
//!
//! Two dispatch regimes (§4.4.1): when no `ResolvedTurnPlan` is supplied the
//! engine uses the plan's own Kahn's-algorithm-with-lane-tiebreak ordering
//! ([`model::ExecutionPlan::topological_order`]); when one is supplied, nodes
//! are additionally routed through the resolved plan's per-lane bounded
//! queues ([`lanes::LaneScheduler`]) as they become dependency-ready, so an
//! overloaded lane can shed before a node ever reaches the pool. Node
//! dispatch itself stays sequential per trace — the `ExecutionPool` is a
//! shared, cross-trace resource, so per-fairness-key contention (scenario 5)
//! is still enforced even though this trace only has one node in flight at a
//! time.

pub mod failure;
pub mod lanes;
pub mod pool;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::admission::check_scheduling_point;
use crate::error::CoreError;
use crate::model::{
    AdaptiveAction, ControlSignal, ExecutionPlan, Lane, NodeSpec, ResolvedTurnPlan, Scope,
    SequenceTriple, normalize_sequence,
};
use crate::model::outcome::Scope as OutcomeScope;
use crate::provider::{Outcome, OutcomeClass};

pub use lanes::{LaneOverflow, LaneQueue, LaneScheduler, WatermarkTransition};

/// Input identifying the turn whose plan is being executed, plus the
/// optional resolved plan that (when present) is authoritative over policy,
/// lane flow control, and provider hydration.
#[derive(Debug, Clone)]
pub struct SchedulingInput {
    pub session_id: String,
    pub turn_id: String,
    pub event_id: String,
    pub pipeline_version: String,
    pub authority_epoch: u64,
    pub resolved_turn_plan: Option<ResolvedTurnPlan>,
}

/// Per-node context handed to a [`NodeRunner`], already hydrated per §4.4.5
/// (preferred provider / allowed adaptive actions taken from the resolved
/// plan when the node doesn't specify its own).
#[derive(Debug, Clone)]
pub struct NodeRunContext {
    pub session_id: String,
    pub turn_id: String,
    pub event_id: String,
    pub pipeline_version: String,
    pub authority_epoch: u64,
    pub preferred_provider: Option<String>,
    pub allowed_adaptive_actions: Vec<AdaptiveAction>,
    pub concurrency_limit: u32,
    pub fairness_key: Option<String>,
}

type BoxedOutcomeFuture<'a> = Pin<Box<dyn Future<Output = Outcome> + Send + 'a>>;

/// The seam through which C4 actually executes a node's work — the concrete
/// behavior (usually a call into the provider invocation controller, C5) is
/// supplied by the caller, keeping the engine itself free of any provider
/// dependency beyond the `Outcome` value type.
pub trait NodeRunner: Send + Sync {
    fn run_node<'a>(&'a self, node: &'a NodeSpec, ctx: &'a NodeRunContext) -> BoxedOutcomeFuture<'a>;
}

/// Result of executing one full plan: whether it ran to completion, why it
/// stopped if not, the dispatch order actually observed, every node's
/// outcome, and the full normalized control-signal batch.
#[derive(Debug, Clone)]
pub struct ExecutionTrace {
    pub completed: bool,
    pub terminal_reason: Option<String>,
    pub dispatched: Vec<String>,
    pub outcomes: Vec<(String, Outcome)>,
    pub signals: Vec<ControlSignal>,
}

fn merge_node_policy(node: &NodeSpec, plan: Option<&ResolvedTurnPlan>) -> (u32, Option<String>) {
    let mut concurrency_limit = node.concurrency_limit;
    let mut fairness_key = node.fairness_key.clone();
    if let Some(plan) = plan {
        if concurrency_limit == 0 {
            if let Some(policy) = plan.node_execution_policies.get(&node.node_id) {
                concurrency_limit = policy.concurrency_limit;
            }
        }
        if fairness_key.is_none() {
            fairness_key = plan.node_execution_policies.get(&node.node_id).and_then(|p| p.fairness_key.clone());
        }
        if fairness_key.is_none() {
            fairness_key = plan.edge_buffer_policies.get("default").and_then(|p| p.fairness_key.clone());
        }
    }
    (concurrency_limit, fairness_key)
}

fn hydrate_preferred_provider(node: &NodeSpec, plan: Option<&ResolvedTurnPlan>) -> Option<String> {
    node.provider.clone().or_else(|| plan.and_then(|p| p.provider_bindings.get(&node.node_type).cloned()))
}

fn hydrate_allowed_actions(plan: Option<&ResolvedTurnPlan>) -> Vec<AdaptiveAction> {
    plan.map(|p| p.allowed_adaptive_actions.clone()).unwrap_or_default()
}

fn check_coherence(input: &SchedulingInput, plan: &ResolvedTurnPlan) -> Result<(), CoreError> {
    if input.turn_id != plan.turn_id {
        return Err(CoreError::InvalidIdentity {
            field: "turn_id".into(),
            reason: format!("scheduling input turn_id {} disagrees with resolved plan {}", input.turn_id, plan.turn_id),
        });
    }
    if input.pipeline_version != plan.pipeline_version {
        return Err(CoreError::InvalidIdentity {
            field: "pipeline_version".into(),
            reason: "scheduling input pipeline_version disagrees with resolved plan".into(),
        });
    }
    if input.authority_epoch != plan.authority_epoch {
        return Err(CoreError::InvalidIdentity {
            field: "authority_epoch".into(),
            reason: "scheduling input authority_epoch disagrees with resolved plan".into(),
        });
    }
    Ok(())
}

struct Cursor<'a> {
    input: &'a SchedulingInput,
    signals: Vec<ControlSignal>,
    outcomes: Vec<(String, Outcome)>,
    dispatched: Vec<String>,
    seq: AtomicU64,
}

impl<'a> Cursor<'a> {
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::AcqRel)
    }

    fn emit(&mut self, signal: &str, reason: String, scope: Scope, lane: Option<Lane>) {
        let now_ms = crate::ids::epoch_ms();
        let sequence = SequenceTriple { transport_sequence: None, runtime_sequence: self.next_seq(), wall_clock_ms: now_ms };
        let mut cs = ControlSignal::new(signal, "RK-25", reason, scope, self.input.authority_epoch, sequence);
        if let Some(lane) = lane {
            cs = cs.with_lane(lane);
        }
        self.signals.push(cs);
    }
}

/// Shed outcome at an enqueue/dispatch scheduling point. Returns `true` when
/// this shed is terminal for the trace (Data/Control); Telemetry overflow is
/// recorded but never stops the trace.
fn shed_node<'a>(cursor: &mut Cursor<'a>, node: &NodeSpec, scope: Scope, reason: &str) -> bool {
    let scheduling = crate::admission::SchedulingInput {
        session_id: cursor.input.session_id.clone(),
        turn_id: cursor.input.turn_id.clone(),
        event_id: cursor.input.event_id.clone(),
        scope: match scope {
            Scope::EdgeEnqueue => OutcomeScope::EdgeEnqueue,
            Scope::NodeDispatch => OutcomeScope::NodeDispatch,
            _ => OutcomeScope::NodeDispatch,
        },
        shed: true,
    };
    let decision = check_scheduling_point(&scheduling);
    debug_assert!(!decision.allowed);
    cursor.emit("shed", reason.to_string(), Scope::Turn, Some(node.lane));
    node.lane.overflow_is_blocking()
}

/// Run `plan` to completion (or to the first terminal failure), dispatching
/// each node through `pool` via `runner`. `hook_timeout` bounds each node's
/// run future; exceeding it is treated as a provider-style timeout outcome
/// so it flows through the same failure-shaping path as any other failure.
pub async fn run_plan(
    plan: &ExecutionPlan,
    input: &SchedulingInput,
    pool: &pool::ExecutionPool,
    runner: &dyn NodeRunner,
    hook_timeout: Duration,
) -> Result<ExecutionTrace, CoreError> {
    plan.validate().map_err(|reason| CoreError::InvalidExecutionPlan { reason })?;
    if let Some(rp) = &input.resolved_turn_plan {
        check_coherence(input, rp)?;
    }

    let index_of: HashMap<&str, usize> =
        plan.nodes.iter().enumerate().map(|(i, n)| (n.node_id.as_str(), i)).collect();
    let mut in_degree = vec![0usize; plan.nodes.len()];
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); plan.nodes.len()];
    for edge in &plan.edges {
        let from = index_of[edge.from.as_str()];
        let to = index_of[edge.to.as_str()];
        adjacency[from].push(to);
        in_degree[to] += 1;
    }

    let mut cursor = Cursor { input, signals: Vec::new(), outcomes: Vec::new(), dispatched: Vec::new(), seq: AtomicU64::new(0) };
    let mut terminal_reason: Option<String> = None;

    if let Some(rp) = &input.resolved_turn_plan {
        // Lane-scheduler regime: nodes become dependency-ready and pass through
        // the per-lane bounded queues before ever reaching the pool.
        let mut scheduler = LaneScheduler::from_flow_control(&rp.flow_control);

        let seed_into_lane = |idx: usize, cursor: &mut Cursor<'_>, scheduler: &mut LaneScheduler| -> Option<String> {
            let node = &plan.nodes[idx];
            match scheduler.enqueue(node.lane, node.node_id.clone()) {
                Ok(WatermarkTransition::CrossedHigh) => {
                    cursor.emit("lane_watermark_high", format!("lane={}", node.lane), Scope::EdgeEnqueue, Some(node.lane));
                    None
                }
                Ok(WatermarkTransition::CrossedLow) => {
                    cursor.emit("lane_watermark_low", format!("lane={}", node.lane), Scope::EdgeEnqueue, Some(node.lane));
                    None
                }
                Ok(WatermarkTransition::None) => None,
                Err(LaneOverflow) => {
                    let terminal = shed_node(cursor, node, Scope::EdgeEnqueue, "lane_queue_capacity_exceeded");
                    terminal.then(|| "lane_queue_capacity_exceeded".to_string())
                }
            }
        };

        let mut initial: Vec<usize> = (0..plan.nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        initial.sort_by(|&a, &b| plan.nodes[a].lane.priority().cmp(&plan.nodes[b].lane.priority()).then(a.cmp(&b)));
        for idx in initial {
            if let Some(reason) = seed_into_lane(idx, &mut cursor, &mut scheduler) {
                terminal_reason = Some(reason);
                break;
            }
        }

        'dispatch: while terminal_reason.is_none() {
            let Some((_lane, node_id, _wm)) = scheduler.dispatch_next() else { break };
            let idx = index_of[node_id.as_str()];
            let node = &plan.nodes[idx];

            if node.shed {
                let terminal = shed_node(&mut cursor, node, Scope::NodeDispatch, "scheduling_point_shed");
                if terminal {
                    terminal_reason = Some("scheduling_point_shed".to_string());
                    break 'dispatch;
                }
            } else if let Some(reason) = dispatch_one(&mut cursor, node, input, pool, runner, hook_timeout).await? {
                terminal_reason = Some(reason);
                break 'dispatch;
            }

            for &succ in &adjacency[idx] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    if let Some(reason) = seed_into_lane(succ, &mut cursor, &mut scheduler) {
                        terminal_reason = Some(reason);
                        break 'dispatch;
                    }
                }
            }
        }
    } else {
        // Topological regime: static order from Kahn's algorithm + lane tiebreak.
        let order = plan.topological_order().ok_or_else(|| CoreError::InvalidExecutionPlan { reason: "execution plan contains a cycle".to_string() })?;
        'topo: for node_id in &order {
            let idx = index_of[node_id.as_str()];
            let node = &plan.nodes[idx];

            if node.shed {
                let terminal = shed_node(&mut cursor, node, Scope::NodeDispatch, "scheduling_point_shed");
                if terminal {
                    terminal_reason = Some("scheduling_point_shed".to_string());
                    break 'topo;
                }
                continue;
            }

            if let Some(reason) = dispatch_one(&mut cursor, node, input, pool, runner, hook_timeout).await? {
                terminal_reason = Some(reason);
                break 'topo;
            }
        }
    }

    normalize_sequence(&mut cursor.signals);

    Ok(ExecutionTrace {
        completed: terminal_reason.is_none(),
        terminal_reason,
        dispatched: cursor.dispatched,
        outcomes: cursor.outcomes,
        signals: cursor.signals,
    })
}

/// Dispatch `node` through `pool`. Returns `Ok(Some(reason))` when this node
/// ends the trace — either a pool rejection on a blocking lane (Data/Control,
/// §4.4.2) or a failure-shaped node outcome with no degrade/fallback
/// (§4.4.4) — and `Ok(None)` when the trace should continue (success,
/// cancelled, degraded/fallback-shaped failure, or a non-blocking Telemetry
/// pool rejection).
async fn dispatch_one<'a>(
    cursor: &mut Cursor<'a>,
    node: &NodeSpec,
    input: &SchedulingInput,
    pool: &pool::ExecutionPool,
    runner: &dyn NodeRunner,
    hook_timeout: Duration,
) -> Result<Option<String>, CoreError> {
    let plan_ref = input.resolved_turn_plan.as_ref();
    let (concurrency_limit, fairness_key) = merge_node_policy(node, plan_ref);
    let ctx = NodeRunContext {
        session_id: input.session_id.clone(),
        turn_id: input.turn_id.clone(),
        event_id: input.event_id.clone(),
        pipeline_version: input.pipeline_version.clone(),
        authority_epoch: input.authority_epoch,
        preferred_provider: hydrate_preferred_provider(node, plan_ref),
        allowed_adaptive_actions: hydrate_allowed_actions(plan_ref),
        concurrency_limit,
        fairness_key: fairness_key.clone(),
    };

    let (tx, rx) = tokio::sync::oneshot::channel::<Outcome>();
    let node_owned = node.clone();
    let task = pool::PoolTask::new(node.node_id.clone(), fairness_key, concurrency_limit, async move {
        let result = tokio::time::timeout(hook_timeout, runner.run_node(&node_owned, &ctx)).await;
        let outcome = result.unwrap_or_else(|_| Outcome {
            class: OutcomeClass::Timeout,
            retryable: true,
            reason: "hook_timeout".to_string(),
            circuit_open: false,
        });
        let _ = tx.send(outcome);
    });

    match pool.submit(task).await {
        Ok(()) => {}
        Err(pool_err) => {
            // Scheduling overload (§4.4.2/§7 kind 4), not a node failure — this
            // never goes through `failure::shape_failure`. Terminal only on a
            // blocking lane (Data/Control); Telemetry degrades to non-blocking.
            let reason = pool_err.shed_reason();
            let terminal = shed_node(cursor, node, Scope::NodeDispatch, reason);
            cursor.dispatched.push(node.node_id.clone());
            return Ok(terminal.then(|| reason.to_string()));
        }
    }

    cursor.dispatched.push(node.node_id.clone());
    let outcome = rx.await.unwrap_or_else(|_| Outcome {
        class: OutcomeClass::InfrastructureFailure,
        retryable: true,
        reason: "node_task_dropped".to_string(),
        circuit_open: false,
    });
    cursor.outcomes.push((node.node_id.clone(), outcome.clone()));
    Ok(handle_outcome(cursor, node, outcome))
}

/// After recording `outcome`, apply failure shaping when it is neither
/// success nor cancelled. Returns `Some(reason)` when the trace must stop.
fn handle_outcome(cursor: &mut Cursor<'_>, node: &NodeSpec, outcome: Outcome) -> Option<String> {
    if outcome.class.is_success() || outcome.class.is_cancelled() {
        return None;
    }
    let now_ms = crate::ids::epoch_ms();
    let authority_epoch = cursor.input.authority_epoch;
    let shaped = failure::shape_failure(node, outcome.class, authority_epoch, || cursor.next_seq(), now_ms);
    cursor.signals.extend(shaped.signals);
    shaped.terminal_reason.filter(|_| shaped.terminal)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
