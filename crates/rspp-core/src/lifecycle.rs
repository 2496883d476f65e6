// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle orchestrator (C1): the per-session serialized owner of the turn
//! FSM. Composes C2 (authority/admission), C3 (plan resolution), and an
//! injected [`LeaseBackend`] to drive `HandleTurnOpen`/`HandleActive`. All FSM
//! mutation for a session funnels through a single `tokio::sync::Mutex<Turn>`:
//! one lock per session, serializing every transition.

use std::future::Future;
use std::pin::Pin;

use crate::admission::{self, CapacityDisposition, SnapshotFailurePolicy};
use crate::error::CoreError;
use crate::ids::epoch_ms;
use crate::model::{DecisionOutcome, OutcomeKind, ResolvedTurnPlan, TransitionTrigger, Turn, TurnState};
use crate::plan_resolver::{self, PlanRequest, ProfileRegistry};

/// What the orchestrator presented to `LeaseBackend::resolve`.
#[derive(Debug, Clone)]
pub struct LeaseResolveInput {
    pub session_id: String,
    pub turn_id: String,
    pub claimed_authority_epoch: u64,
}

/// Authority facts resolved from the control plane for one `HandleTurnOpen`
/// call (§6: `LeaseBackend.Resolve`).
#[derive(Debug, Clone)]
pub struct LeaseResolution {
    pub authority_epoch: u64,
    pub authority_epoch_valid: bool,
    pub authority_authorized: bool,
    pub lease_token_id: String,
    pub lease_expires_at_utc: String,
    pub lease_resolution_snapshot: String,
}

type BoxedLeaseFuture<'a> = Pin<Box<dyn Future<Output = LeaseResolution> + Send + 'a>>;

/// Authority source consulted once per `HandleTurnOpen`, kept external to
/// the core per the excluded-collaborators list in §1.
pub trait LeaseBackend: Send + Sync {
    fn resolve<'a>(&'a self, input: &'a LeaseResolveInput) -> BoxedLeaseFuture<'a>;
}

/// Input to `HandleTurnOpen`.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub session_id: String,
    pub turn_id: String,
    pub event_id: String,
    pub claimed_authority_epoch: u64,
    pub snapshot_valid: bool,
    pub snapshot_failure_policy: SnapshotFailurePolicy,
    pub capacity_disposition: CapacityDisposition,
    pub plan_request: PlanRequest,
}

/// One of the turn-lifecycle events named in §6: `turn_open`, `commit`,
/// `abort`, `close`, `reject`, `defer`, `stale_epoch_reject`, or
/// `deauthorized_drain`, carrying reason and timing.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub name: &'static str,
    pub turn_id: String,
    pub reason: String,
    pub runtime_timestamp_ms: u64,
}

/// Result of `HandleTurnOpen`: the admission/authority outcome, the turn's
/// resulting state, the materialized plan (only on the allow path), and the
/// lifecycle event the transition produced (`None` only if the input itself
/// was rejected before any FSM mutation, e.g. a session mismatch).
#[derive(Debug, Clone)]
pub struct OpenResult {
    pub outcome: DecisionOutcome,
    pub state: TurnState,
    pub plan: Option<ResolvedTurnPlan>,
    pub lifecycle_event: Option<LifecycleEvent>,
}

/// The terminal trigger driving `HandleActive`'s Active→Terminal edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalTrigger {
    Commit,
    Abort,
}

/// Input to `HandleActive`.
#[derive(Debug, Clone)]
pub struct ActiveInput {
    pub session_id: String,
    pub turn_id: String,
    pub terminal_ready: bool,
    pub terminal_trigger: Option<TerminalTrigger>,
    pub terminal_reason: String,
}

/// Result of `HandleActive`: the turn's resulting state and, once terminal
/// readiness fires, exactly the two events `[commit|abort, close]` in order.
#[derive(Debug, Clone)]
pub struct ActiveResult {
    pub state: TurnState,
    pub events: Vec<LifecycleEvent>,
}

/// Read-only status accessor (§4.1 supplement) — does not participate in
/// FSM mutation.
#[derive(Debug, Clone)]
pub struct TurnSnapshot {
    pub turn_id: String,
    pub state: TurnState,
    pub plan_hash: Option<String>,
}

fn reject_trigger(kind: OutcomeKind) -> Option<TransitionTrigger> {
    match kind {
        OutcomeKind::Reject => Some(TransitionTrigger::Reject),
        OutcomeKind::Defer => Some(TransitionTrigger::Defer),
        OutcomeKind::StaleEpochReject => Some(TransitionTrigger::StaleEpochReject),
        OutcomeKind::DeauthorizedDrain => Some(TransitionTrigger::DeauthorizedDrain),
        OutcomeKind::Admit | OutcomeKind::Shed => None,
    }
}

/// Per-session owner of the turn FSM (§4.1). One instance per session; the
/// caller is expected to key a map of these by `sessionID`.
pub struct Lifecycle {
    session_id: String,
    registry: ProfileRegistry,
    slot: tokio::sync::Mutex<Turn>,
}

impl Lifecycle {
    pub fn new(session_id: impl Into<String>, registry: ProfileRegistry) -> Self {
        let session_id = session_id.into();
        Self { slot: tokio::sync::Mutex::new(Turn::new(String::new())), session_id, registry }
    }

    /// Current turn state and bound plan hash, for status surfaces.
    pub async fn snapshot(&self) -> TurnSnapshot {
        let turn = self.slot.lock().await;
        TurnSnapshot {
            turn_id: turn.turn_id.clone(),
            state: turn.state,
            plan_hash: turn.plan.as_ref().map(|p| p.plan_hash.clone()),
        }
    }

    /// `propose(turnID)` + C2 + C3, per §4.1. Fails with `TurnAlreadyOpen`
    /// if another turn is still in flight, with `SessionMismatch` if
    /// `req.session_id` doesn't match this orchestrator.
    pub async fn handle_turn_open(
        &self,
        lease_backend: &dyn LeaseBackend,
        req: OpenRequest,
    ) -> Result<OpenResult, CoreError> {
        if req.session_id != self.session_id {
            return Err(CoreError::SessionMismatch { expected: self.session_id.clone(), got: req.session_id });
        }

        let mut turn = self.slot.lock().await;
        if turn.is_non_terminal() {
            return Err(CoreError::TurnAlreadyOpen { existing_turn_id: turn.turn_id.clone() });
        }

        let now_ms = epoch_ms();
        let mut proposed = Turn::new(req.turn_id.clone());
        proposed.apply(TransitionTrigger::TurnOpenProposed, now_ms)?;
        *turn = proposed;

        let lease = lease_backend
            .resolve(&LeaseResolveInput {
                session_id: req.session_id.clone(),
                turn_id: req.turn_id.clone(),
                claimed_authority_epoch: req.claimed_authority_epoch,
            })
            .await;

        let admission_req = admission::OpenRequest {
            session_id: req.session_id.clone(),
            turn_id: req.turn_id.clone(),
            event_id: req.event_id.clone(),
            authority_epoch: lease.authority_epoch,
            authority_epoch_valid: lease.authority_epoch_valid,
            authority_authorized: lease.authority_authorized,
            snapshot_valid: req.snapshot_valid,
            snapshot_failure_policy: req.snapshot_failure_policy,
            capacity_disposition: req.capacity_disposition,
        };
        let decision = admission::check_open(&admission_req);

        if !decision.allowed {
            let trigger = reject_trigger(decision.outcome.kind).ok_or_else(|| CoreError::InvalidIdentity {
                field: "outcome_kind".into(),
                reason: "admission denial produced a non-rejection outcome kind".into(),
            })?;
            turn.apply(trigger, now_ms)?;
            let event = LifecycleEvent {
                name: trigger.as_str(),
                turn_id: req.turn_id.clone(),
                reason: decision.outcome.reason.clone(),
                runtime_timestamp_ms: now_ms,
            };
            return Ok(OpenResult { outcome: decision.outcome, state: turn.state, plan: None, lifecycle_event: Some(event) });
        }

        // Materialization failure (or any other CoreError from C3) leaves no
        // legal FSM edge to take from Opening — reset the slot to a fresh,
        // Idle-state Turn for the same turn_id so the session isn't wedged,
        // then propagate the error.
        let plan = match plan_resolver::resolve(&req.plan_request, &self.registry) {
            Ok(plan) => plan,
            Err(err) => {
                *turn = Turn::new(req.turn_id.clone());
                return Err(err);
            }
        };

        turn.apply(TransitionTrigger::TurnOpen, now_ms)?;
        turn.plan = Some(plan.clone());

        let event = LifecycleEvent {
            name: TransitionTrigger::TurnOpen.as_str(),
            turn_id: req.turn_id.clone(),
            reason: decision.outcome.reason.clone(),
            runtime_timestamp_ms: now_ms,
        };

        Ok(OpenResult { outcome: decision.outcome, state: turn.state, plan: Some(plan), lifecycle_event: Some(event) })
    }

    /// Active-turn terminal sequencing: on `terminal_ready`, applies
    /// exactly `commit|abort` then exactly one `close`, per §4.1.
    pub async fn handle_active(&self, req: ActiveInput) -> Result<ActiveResult, CoreError> {
        if req.session_id != self.session_id {
            return Err(CoreError::SessionMismatch { expected: self.session_id.clone(), got: req.session_id });
        }

        let mut turn = self.slot.lock().await;
        if turn.turn_id != req.turn_id {
            return Err(CoreError::InvalidIdentity {
                field: "turn_id".into(),
                reason: format!("no in-flight turn {} on this session", req.turn_id),
            });
        }

        if !req.terminal_ready {
            return Ok(ActiveResult { state: turn.state, events: Vec::new() });
        }

        let trigger = match req.terminal_trigger {
            Some(TerminalTrigger::Commit) => TransitionTrigger::Commit,
            Some(TerminalTrigger::Abort) => TransitionTrigger::Abort,
            None => {
                return Err(CoreError::InvalidIdentity {
                    field: "terminal_trigger".into(),
                    reason: "terminal_ready requires commit or abort".into(),
                });
            }
        };

        let now_ms = epoch_ms();
        turn.apply(trigger, now_ms)?;
        let terminal_event = LifecycleEvent {
            name: trigger.as_str(),
            turn_id: turn.turn_id.clone(),
            reason: req.terminal_reason.clone(),
            runtime_timestamp_ms: now_ms,
        };

        turn.apply(TransitionTrigger::Close, now_ms)?;
        let close_event = LifecycleEvent {
            name: TransitionTrigger::Close.as_str(),
            turn_id: turn.turn_id.clone(),
            reason: "turn_closed".to_string(),
            runtime_timestamp_ms: now_ms,
        };

        Ok(ActiveResult { state: turn.state, events: vec![terminal_event, close_event] })
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
