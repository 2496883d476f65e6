// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use super::plan::ResolvedTurnPlan;

/// Turn lifecycle state (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    Opening,
    Active,
    Terminal,
    Closed,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Opening => "opening",
            Self::Active => "active",
            Self::Terminal => "terminal",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// FSM transition trigger. Every variant is marked deterministic; a trigger
/// not among the six legal edges is rejected by the FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    TurnOpenProposed,
    TurnOpen,
    Reject,
    Defer,
    StaleEpochReject,
    DeauthorizedDrain,
    Commit,
    Abort,
    Close,
}

impl TransitionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TurnOpenProposed => "turn_open_proposed",
            Self::TurnOpen => "turn_open",
            Self::Reject => "reject",
            Self::Defer => "defer",
            Self::StaleEpochReject => "stale_epoch_reject",
            Self::DeauthorizedDrain => "deauthorized_drain",
            Self::Commit => "commit",
            Self::Abort => "abort",
            Self::Close => "close",
        }
    }

    /// The single legal `(from, to)` edge for this trigger, if any.
    pub fn legal_edge(&self) -> (TurnState, TurnState) {
        match self {
            Self::TurnOpenProposed => (TurnState::Idle, TurnState::Opening),
            Self::TurnOpen => (TurnState::Opening, TurnState::Active),
            Self::Reject | Self::Defer | Self::StaleEpochReject | Self::DeauthorizedDrain => {
                (TurnState::Opening, TurnState::Idle)
            }
            Self::Commit | Self::Abort => (TurnState::Active, TurnState::Terminal),
            Self::Close => (TurnState::Terminal, TurnState::Closed),
        }
    }
}

impl std::fmt::Display for TransitionTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One conversational round, bound to at most one `ResolvedTurnPlan`.
pub struct Turn {
    pub turn_id: String,
    pub state: TurnState,
    pub plan: Option<ResolvedTurnPlan>,
    pub opened_at_ms: Option<u64>,
    pub closed_at_ms: Option<u64>,
}

impl Turn {
    pub fn new(turn_id: impl Into<String>) -> Self {
        Self { turn_id: turn_id.into(), state: TurnState::Idle, plan: None, opened_at_ms: None, closed_at_ms: None }
    }

    /// `true` while a turn is in flight (`Opening`/`Active`/`Terminal`).
    /// `Idle` and `Closed` both mean "no turn occupies this session slot" —
    /// a fresh `propose` is allowed from either (§8: at-most-one-active-turn
    /// blocks a second `propose` only while the first is actually in flight).
    pub fn is_non_terminal(&self) -> bool {
        matches!(self.state, TurnState::Opening | TurnState::Active | TurnState::Terminal)
    }

    /// Apply `trigger`, checking it against the current state. Returns the
    /// new state on success.
    pub fn apply(&mut self, trigger: TransitionTrigger, now_ms: u64) -> Result<TurnState, crate::error::CoreError> {
        let (from, to) = trigger.legal_edge();
        if self.state != from {
            return Err(crate::error::CoreError::IllegalTransition {
                from: self.state.to_string(),
                trigger: trigger.to_string(),
            });
        }
        if matches!(trigger, TransitionTrigger::TurnOpen) {
            self.opened_at_ms = Some(now_ms);
        }
        if matches!(trigger, TransitionTrigger::Close) {
            self.closed_at_ms = Some(now_ms);
        }
        self.state = to;
        Ok(to)
    }
}

#[cfg(test)]
#[path = "turn_tests.rs"]
mod tests;
