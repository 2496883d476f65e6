// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_basic_utc_timestamp() {
    let ms = parse_rfc3339_millis("1970-01-01T00:00:00Z").unwrap();
    assert_eq!(ms, 0);
}

#[test]
fn parses_fractional_seconds() {
    let ms = parse_rfc3339_millis("1970-01-01T00:00:00.250Z").unwrap();
    assert_eq!(ms, 250);
}

#[test]
fn orders_issued_before_expires() {
    let issued = parse_rfc3339_millis("2026-01-01T00:00:00Z").unwrap();
    let expires = parse_rfc3339_millis("2026-01-01T01:00:00Z").unwrap();
    assert!(issued < expires);
}

#[test]
fn rejects_malformed_input() {
    assert!(parse_rfc3339_millis("not-a-date").is_none());
    assert!(!is_rfc3339("2026-13-40T99:99:99Z"));
}

#[test]
fn provider_invocation_id_is_stable_for_same_inputs() {
    let a = provider_invocation_id("sess-1", "turn-1", "evt-1", "stt");
    let b = provider_invocation_id("sess-1", "turn-1", "evt-1", "stt");
    assert_eq!(a, b);
    assert_eq!(a, "pvi/sess-1/turn-1/evt-1/stt");
}
