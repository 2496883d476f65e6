// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Unrecoverable invariant violations that propagate across the orchestrator
/// boundary as errors rather than being re-expressed as a `DecisionOutcome`.
///
/// Every other condition named in the contract (authority, admission,
/// scheduling overload, provider failure, node failure) is handled by the
/// component that owns it and surfaced as an outcome or control signal
/// instead — see the propagation policy in the error handling design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identity field, snapshot reference, or policy-surface override
    /// failed validation.
    InvalidIdentity { field: String, reason: String },
    /// Fewer than the six required snapshot provenance references were
    /// supplied, or one was empty.
    IncompleteSnapshotProvenance { missing: String },
    /// Some but not all fields of a policy-surface override were set.
    PartialOverride { surface: String },
    /// The named execution profile has no registered defaults.
    UnsupportedExecutionProfile { profile: String },
    /// The plan resolver's injectable failure hook fired (test-only path).
    MaterializationFailed { reason: String },
    /// An `ExecutionPlan` failed structural validation (cycle, duplicate
    /// node, dangling edge, self-edge).
    InvalidExecutionPlan { reason: String },
    /// A requested FSM transition is not one of the six legal edges.
    IllegalTransition { from: String, trigger: String },
    /// Another turn is already non-terminal for this session.
    TurnAlreadyOpen { existing_turn_id: String },
    /// The caller's `sessionID` does not match the orchestrator it was sent to.
    SessionMismatch { expected: String, got: String },
}

impl CoreError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidIdentity { .. } => "invalid_identity",
            Self::IncompleteSnapshotProvenance { .. } => "incomplete_snapshot_provenance",
            Self::PartialOverride { .. } => "partial_override",
            Self::UnsupportedExecutionProfile { .. } => "unsupported_execution_profile",
            Self::MaterializationFailed { .. } => "materialization_failed",
            Self::InvalidExecutionPlan { .. } => "invalid_execution_plan",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::TurnAlreadyOpen { .. } => "turn_already_open",
            Self::SessionMismatch { .. } => "session_mismatch",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIdentity { field, reason } => {
                write!(f, "invalid identity field {field}: {reason}")
            }
            Self::IncompleteSnapshotProvenance { missing } => {
                write!(f, "incomplete snapshot provenance: missing {missing}")
            }
            Self::PartialOverride { surface } => {
                write!(f, "partial override: {surface} surface is only partially set")
            }
            Self::UnsupportedExecutionProfile { profile } => {
                write!(f, "unsupported execution_profile: {profile}")
            }
            Self::MaterializationFailed { reason } => {
                write!(f, "materialization_failed: {reason}")
            }
            Self::InvalidExecutionPlan { reason } => write!(f, "invalid execution plan: {reason}"),
            Self::IllegalTransition { from, trigger } => {
                write!(f, "illegal transition: {trigger} is not valid from {from}")
            }
            Self::TurnAlreadyOpen { existing_turn_id } => {
                write!(f, "turn already open: {existing_turn_id}")
            }
            Self::SessionMismatch { expected, got } => {
                write!(f, "session mismatch: expected {expected}, got {got}")
            }
        }
    }
}

impl std::error::Error for CoreError {}

/// Errors from the bounded execution pool (§4.4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// The per-fairness-key outstanding budget would be exceeded.
    NodeConcurrencyExceeded,
    /// The key reservation succeeded but the ring buffer had no room.
    QueueFull,
    /// The pool has drained and closed; no further submissions are accepted.
    Closed,
}

impl PoolError {
    /// Scheduling-decision reason string C4 attaches to the resulting shed.
    pub fn shed_reason(&self) -> &'static str {
        match self {
            Self::NodeConcurrencyExceeded => "node_concurrency_limited",
            Self::QueueFull => "execution_pool_saturated",
            Self::Closed => "execution_pool_closed",
        }
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.shed_reason())
    }
}

impl std::error::Error for PoolError {}

/// Node lifecycle hook (`Init/Start/HandleEvent/OnCancel/Stop`) exceeded its
/// configured timeout. The node is left unmarked as started/stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookTimeoutError {
    pub hook: &'static str,
}

impl fmt::Display for HookTimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook timeout: {}", self.hook)
    }
}

impl std::error::Error for HookTimeoutError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
