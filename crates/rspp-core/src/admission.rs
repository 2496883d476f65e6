// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authority & admission guard (C2): a stateless pre-turn gate plus a
//! scheduling-point gate invoked by the execution engine at edge_enqueue,
//! edge_dequeue, and node_dispatch.

use crate::ids::epoch_ms;
use crate::model::{DecisionOutcome, Emitter, OutcomeKind, Phase, Scope};

/// Disposition reported by the control plane's capacity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityDisposition {
    Allow,
    Defer,
    Reject,
}

impl CapacityDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Defer => "defer",
            Self::Reject => "reject",
        }
    }
}

/// Policy for how to respond to a missing/invalid control-plane snapshot.
/// Defaults to `Defer` when unspecified, per the admission contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFailurePolicy {
    Defer,
    Reject,
}

impl Default for SnapshotFailurePolicy {
    fn default() -> Self {
        Self::Defer
    }
}

/// Input to the pre-turn authority + admission gate.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub session_id: String,
    pub turn_id: String,
    pub event_id: String,
    pub authority_epoch: u64,
    pub authority_epoch_valid: bool,
    pub authority_authorized: bool,
    pub snapshot_valid: bool,
    pub snapshot_failure_policy: SnapshotFailurePolicy,
    pub capacity_disposition: CapacityDisposition,
}

/// Input to the scheduling-point gate, invoked by C4 at a scheduling scope.
#[derive(Debug, Clone)]
pub struct SchedulingInput {
    pub session_id: String,
    pub turn_id: String,
    pub event_id: String,
    pub scope: Scope,
    pub shed: bool,
}

/// Whether the gate allowed the turn/scheduling point through, plus the
/// outcome that justifies the decision either way.
#[derive(Debug, Clone)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub outcome: DecisionOutcome,
}

#[allow(clippy::too_many_arguments)]
fn outcome(
    kind: OutcomeKind,
    phase: Phase,
    scope: Scope,
    emitter: Emitter,
    session_id: &str,
    turn_id: Option<&str>,
    event_id: &str,
    authority_epoch: Option<u64>,
    reason: &str,
) -> DecisionOutcome {
    let now = epoch_ms();
    DecisionOutcome {
        kind,
        phase,
        scope,
        emitter,
        session_id: session_id.to_string(),
        turn_id: turn_id.map(str::to_string),
        event_id: event_id.to_string(),
        runtime_timestamp_ms: now,
        wall_clock_ms: now,
        timestamp_ms: None,
        authority_epoch,
        reason: reason.to_string(),
    }
}

/// Run the two-stage pre-turn gate: authority (`RK-24`) then admission
/// (`RK-25`). Authority is checked first — a stale or deauthorized epoch
/// denies before admission capacity is even considered.
pub fn check_open(req: &OpenRequest) -> AdmissionDecision {
    let turn_scope = Scope::Turn;

    if !req.authority_epoch_valid {
        return AdmissionDecision {
            allowed: false,
            outcome: outcome(
                OutcomeKind::StaleEpochReject,
                Phase::PreTurn,
                turn_scope,
                Emitter::Rk24,
                &req.session_id,
                Some(&req.turn_id),
                &req.event_id,
                Some(req.authority_epoch),
                "authority_epoch_invalid",
            ),
        };
    }
    if !req.authority_authorized {
        return AdmissionDecision {
            allowed: false,
            outcome: outcome(
                OutcomeKind::DeauthorizedDrain,
                Phase::PreTurn,
                turn_scope,
                Emitter::Rk24,
                &req.session_id,
                Some(&req.turn_id),
                &req.event_id,
                Some(req.authority_epoch),
                "authority_not_granted",
            ),
        };
    }

    if !req.snapshot_valid {
        let kind = match req.snapshot_failure_policy {
            SnapshotFailurePolicy::Defer => OutcomeKind::Defer,
            SnapshotFailurePolicy::Reject => OutcomeKind::Reject,
        };
        return AdmissionDecision {
            allowed: false,
            outcome: outcome(
                kind,
                Phase::PreTurn,
                turn_scope,
                Emitter::Rk25,
                &req.session_id,
                Some(&req.turn_id),
                &req.event_id,
                None,
                "snapshot_invalid_or_missing",
            ),
        };
    }

    match req.capacity_disposition {
        CapacityDisposition::Allow => AdmissionDecision {
            allowed: true,
            outcome: outcome(
                OutcomeKind::Admit,
                Phase::PreTurn,
                turn_scope,
                Emitter::Rk25,
                &req.session_id,
                Some(&req.turn_id),
                &req.event_id,
                None,
                "admission_capacity_allow",
            ),
        },
        CapacityDisposition::Defer => AdmissionDecision {
            allowed: false,
            outcome: outcome(
                OutcomeKind::Defer,
                Phase::PreTurn,
                turn_scope,
                Emitter::Rk25,
                &req.session_id,
                Some(&req.turn_id),
                &req.event_id,
                None,
                "admission_capacity_defer",
            ),
        },
        CapacityDisposition::Reject => AdmissionDecision {
            allowed: false,
            outcome: outcome(
                OutcomeKind::Reject,
                Phase::PreTurn,
                turn_scope,
                Emitter::Rk25,
                &req.session_id,
                Some(&req.turn_id),
                &req.event_id,
                None,
                "admission_capacity_reject",
            ),
        },
    }
}

/// Scheduling-point re-admission, invoked at edge_enqueue/edge_dequeue/
/// node_dispatch. Only sheds — it never rejects/defers, since the turn is
/// already active.
pub fn check_scheduling_point(req: &SchedulingInput) -> AdmissionDecision {
    if req.shed {
        AdmissionDecision {
            allowed: false,
            outcome: outcome(
                OutcomeKind::Shed,
                Phase::SchedulingPoint,
                req.scope,
                Emitter::Rk25,
                &req.session_id,
                Some(&req.turn_id),
                &req.event_id,
                None,
                "scheduling_point_shed",
            ),
        }
    } else {
        AdmissionDecision {
            allowed: true,
            outcome: outcome(
                OutcomeKind::Admit,
                Phase::SchedulingPoint,
                req.scope,
                Emitter::Rk25,
                &req.session_id,
                Some(&req.turn_id),
                &req.event_id,
                None,
                "scheduling_point_allow",
            ),
        }
    }
}

#[cfg(test)]
#[path = "admission_tests.rs"]
mod tests;
