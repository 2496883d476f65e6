// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core data model (§3): sessions, turns, resolved plans, and the outcome/
//! signal contract. Tagged enumerations are closed and validated at
//! construction rather than modeled as open strings.

pub mod lease;
pub mod outcome;
pub mod plan;
pub mod session;
pub mod signal;
pub mod turn;

pub use lease::{
    LeaseTokenRef, PlacementLease, RouteEndpoint, SessionRoute, SessionStatus, SessionStatusView,
    SignedSessionToken, TokenClaims, TransportKind,
};
pub use outcome::{DecisionOutcome, Emitter, OutcomeKind, OutcomeValidationError, Phase, Scope};
pub use plan::{
    AdaptiveAction, BufferStrategy, DeterminismContext, EdgeBufferPolicy, EdgeSpec, ExecutionPlan,
    ExecutionProfile, FlowControlPolicy, Lane, LaneFlowControl, NodeExecutionPolicy, NodeSpec,
    RecordingLevel, RecordingPolicy, ResolvedTurnPlan, SnapshotProvenance, StreamingHandoffPolicy,
    TurnBudgets,
};
pub use session::{Session, SessionHot};
pub use signal::{ControlSignal, SequenceTriple};
pub use turn::{Turn, TurnState, TransitionTrigger};
