// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::model::Lane;

fn node(allow_degrade: bool, allow_fallback: bool) -> NodeSpec {
    NodeSpec {
        node_id: "node-1".to_string(),
        node_type: "llm".to_string(),
        lane: Lane::Data,
        provider: None,
        shed: false,
        reason: None,
        allow_degrade,
        allow_fallback,
        concurrency_limit: 0,
        fairness_key: None,
    }
}

fn seq() -> impl FnMut() -> u64 {
    let mut n = 0u64;
    move || {
        n += 1;
        n
    }
}

#[test]
fn non_degradable_non_fallback_failure_is_terminal() {
    let node = node(false, false);
    let result = shape_failure(&node, OutcomeClass::InfrastructureFailure, 1, seq(), 0);
    assert!(result.terminal);
    assert_eq!(result.terminal_reason.as_deref(), Some("node_timeout_or_failure"));
    assert!(result.signals.iter().any(|s| s.signal == "budget_warning"));
    assert!(result.signals.iter().any(|s| s.signal == "budget_exhausted"));
}

#[test]
fn degradable_node_shapes_to_degrade_non_terminal() {
    let node = node(true, false);
    let result = shape_failure(&node, OutcomeClass::Timeout, 1, seq(), 0);
    assert!(!result.terminal);
    assert!(result.terminal_reason.is_none());
    assert!(result.signals.iter().any(|s| s.signal == "degrade"));
}

#[test]
fn fallback_takes_precedence_when_degrade_not_allowed() {
    let node = node(false, true);
    let result = shape_failure(&node, OutcomeClass::Overload, 1, seq(), 0);
    assert!(!result.terminal);
    assert!(result.signals.iter().any(|s| s.signal == "fallback"));
}

#[test]
fn degrade_wins_over_fallback_when_both_allowed() {
    let node = node(true, true);
    let result = shape_failure(&node, OutcomeClass::Blocked, 1, seq(), 0);
    assert!(result.signals.iter().any(|s| s.signal == "degrade"));
    assert!(!result.signals.iter().any(|s| s.signal == "fallback"));
}

#[test]
fn every_shaped_signal_carries_the_node_lane() {
    let node = node(true, false);
    let result = shape_failure(&node, OutcomeClass::Timeout, 1, seq(), 0);
    assert!(result.signals.iter().all(|s| s.lane == Some(Lane::Data)));
}
