// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Outcome kind. Closed sum type over the six admission/authority decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Admit,
    Reject,
    Defer,
    Shed,
    StaleEpochReject,
    DeauthorizedDrain,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admit => "admit",
            Self::Reject => "reject",
            Self::Defer => "defer",
            Self::Shed => "shed",
            Self::StaleEpochReject => "stale_epoch_reject",
            Self::DeauthorizedDrain => "deauthorized_drain",
        }
    }
}

/// The point in the turn's life the decision was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreTurn,
    SchedulingPoint,
    ActiveTurn,
}

/// What the decision applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Tenant,
    Session,
    Turn,
    EdgeEnqueue,
    EdgeDequeue,
    NodeDispatch,
}

impl Scope {
    pub fn is_scheduling_scope(&self) -> bool {
        matches!(self, Self::EdgeEnqueue | Self::EdgeDequeue | Self::NodeDispatch)
    }
}

/// The component that emitted the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Emitter {
    #[serde(rename = "RK-24")]
    Rk24,
    #[serde(rename = "RK-25")]
    Rk25,
    #[serde(rename = "CP-05")]
    Cp05,
}

/// A single admission/authority decision, produced by C2 and C4, normalized
/// by C7, then handed to the timeline recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub kind: OutcomeKind,
    pub phase: Phase,
    pub scope: Scope,
    pub emitter: Emitter,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
    pub event_id: String,
    pub runtime_timestamp_ms: u64,
    pub wall_clock_ms: u64,
    /// Schema-only per the open question in §9: accepted but treated as
    /// informational, never validated against runtime/wallclock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_epoch: Option<u64>,
    pub reason: String,
}

/// A single `DecisionOutcome` validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeValidationError(pub String);

impl std::fmt::Display for OutcomeValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for OutcomeValidationError {}

impl DecisionOutcome {
    /// Validate against the §4.7 invariant table. Rejects a malformed
    /// outcome before it is accepted into the timeline.
    pub fn validate(&self) -> Result<(), OutcomeValidationError> {
        let err = |msg: &str| Err(OutcomeValidationError(msg.to_string()));

        if self.session_id.is_empty() {
            return err("session_id must be non-empty");
        }
        if self.event_id.is_empty() {
            return err("event_id must be non-empty");
        }
        if self.reason.is_empty() {
            return err("reason must be non-empty");
        }

        match self.kind {
            OutcomeKind::Admit | OutcomeKind::Reject | OutcomeKind::Defer => {
                if !matches!(self.emitter, Emitter::Rk25 | Emitter::Cp05) {
                    return err("admission emitters must be RK-25 or CP-05");
                }
            }
            OutcomeKind::Shed => {
                if self.emitter != Emitter::Rk25 {
                    return err("shed must be emitted by RK-25");
                }
                if self.phase != Phase::SchedulingPoint {
                    return err("shed must be phase=scheduling_point");
                }
            }
            OutcomeKind::StaleEpochReject | OutcomeKind::DeauthorizedDrain => {
                if self.emitter != Emitter::Rk24 {
                    return err("authority outcomes must be emitted by RK-24");
                }
                if self.authority_epoch.is_none() {
                    return err("authority outcomes must carry authority_epoch");
                }
            }
        }

        if self.emitter == Emitter::Cp05 {
            if self.phase != Phase::PreTurn {
                return err("CP-05 must be phase=pre_turn");
            }
            if !matches!(self.scope, Scope::Tenant | Scope::Session) {
                return err("CP-05 scope must be tenant or session");
            }
        }

        match self.phase {
            Phase::SchedulingPoint => {
                if !self.scope.is_scheduling_scope() {
                    return err("scheduling_point requires an edge/node scope");
                }
            }
            Phase::ActiveTurn => {
                if !(self.scope == Scope::Turn || self.scope.is_scheduling_scope()) {
                    return err("active_turn requires scope=turn or a scheduling scope");
                }
                if self.turn_id.is_none() {
                    return err("active_turn requires turn_id");
                }
            }
            Phase::PreTurn => {
                if !matches!(self.scope, Scope::Tenant | Scope::Session | Scope::Turn) {
                    return err("pre_turn requires scope in {tenant, session, turn}");
                }
            }
        }

        if self.scope == Scope::Turn && self.turn_id.is_none() {
            return err("scope=turn requires turn_id");
        }

        if self.kind == OutcomeKind::DeauthorizedDrain {
            match self.phase {
                Phase::PreTurn if !matches!(self.scope, Scope::Session | Scope::Turn) => {
                    return err("deauthorized pre_turn requires scope in {session, turn}");
                }
                Phase::ActiveTurn if self.scope != Scope::Turn => {
                    return err("deauthorized active_turn requires scope=turn");
                }
                _ => {}
            }
        }

        if self.kind == OutcomeKind::StaleEpochReject {
            match self.phase {
                Phase::PreTurn if !matches!(self.scope, Scope::Session | Scope::Turn) => {
                    return err("stale_epoch pre_turn requires scope in {session, turn}");
                }
                Phase::ActiveTurn => {
                    return err("stale_epoch may only occur at pre_turn or scheduling_point");
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "outcome_tests.rs"]
mod tests;
