// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure shaping (§4.4.4): decides whether a non-success, non-cancelled
//! node outcome degrades the trace, falls back, or ends it.

use crate::model::{ControlSignal, NodeSpec, Scope, SequenceTriple};
use crate::provider::OutcomeClass;

/// What happened to the trace as a result of shaping one node's failure.
#[derive(Debug, Clone)]
pub struct FailureShapeResult {
    pub signals: Vec<ControlSignal>,
    pub terminal: bool,
    pub terminal_reason: Option<String>,
}

/// Shape a node's outcome. Only called when `outcome_class` is neither
/// `success` nor `cancelled` — callers skip this entirely otherwise.
pub fn shape_failure(
    node: &NodeSpec,
    outcome_class: OutcomeClass,
    authority_epoch: u64,
    mut next_seq: impl FnMut() -> u64,
    now_ms: u64,
) -> FailureShapeResult {
    let mut signals = Vec::new();
    let mut sig = |name: &str, reason: String| -> ControlSignal {
        let sequence = SequenceTriple { transport_sequence: None, runtime_sequence: next_seq(), wall_clock_ms: now_ms };
        ControlSignal::new(name, "RK-25", reason, Scope::NodeDispatch, authority_epoch, sequence).with_lane(node.lane)
    };

    signals.push(sig("budget_warning", "node_budget_threshold_exceeded".to_string()));
    signals.push(sig("budget_exhausted", "node_timeout_or_failure".to_string()));

    if node.allow_degrade {
        signals.push(sig("degrade", format!("node={} class={}", node.node_id, outcome_class.as_str())));
        return FailureShapeResult { signals, terminal: false, terminal_reason: None };
    }
    if node.allow_fallback {
        signals.push(sig("fallback", format!("node={} class={}", node.node_id, outcome_class.as_str())));
        return FailureShapeResult { signals, terminal: false, terminal_reason: None };
    }

    FailureShapeResult { signals, terminal: true, terminal_reason: Some("node_timeout_or_failure".to_string()) }
}

#[cfg(test)]
#[path = "failure_tests.rs"]
mod tests;
