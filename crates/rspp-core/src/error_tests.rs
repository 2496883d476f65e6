// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn pool_error_shed_reasons_match_contract() {
    assert_eq!(PoolError::QueueFull.shed_reason(), "execution_pool_saturated");
    assert_eq!(PoolError::NodeConcurrencyExceeded.shed_reason(), "node_concurrency_limited");
    assert_eq!(PoolError::Closed.shed_reason(), "execution_pool_closed");
}

#[test]
fn core_error_display_is_non_empty() {
    let err = CoreError::IllegalTransition { from: "Idle".into(), trigger: "commit".into() };
    assert!(err.to_string().contains("commit"));
    assert_eq!(err.as_str(), "illegal_transition");
}
