// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;

fn chunk(sequence: u64, bytes_len: usize, is_final: bool) -> StreamChunk {
    StreamChunk { sequence, bytes_len, text: Some("hi".to_string()), is_final }
}

#[test]
fn tallies_chunk_count_and_bytes() {
    let observer = AggregatingObserver::new();
    observer.on_chunk(&chunk(1, 10, false));
    observer.on_chunk(&chunk(2, 5, false));

    let snapshot = observer.snapshot();
    assert_eq!(snapshot.chunk_count, 2);
    assert_eq!(snapshot.total_bytes, 15);
    assert!(snapshot.first_chunk_at_ms.is_some());
}

#[test]
fn first_chunk_timestamp_is_recorded_once() {
    let observer = AggregatingObserver::new();
    observer.on_chunk(&chunk(1, 1, false));
    let first = observer.snapshot().first_chunk_at_ms.unwrap();
    observer.on_chunk(&chunk(2, 1, false));
    let second = observer.snapshot().first_chunk_at_ms.unwrap();
    assert_eq!(first, second);
}

#[test]
fn on_complete_marks_completed() {
    let observer = AggregatingObserver::new();
    observer.on_complete(&Outcome::success("ok"));
    assert!(observer.snapshot().completed);
}

#[test]
fn on_error_marks_errored() {
    let observer = AggregatingObserver::new();
    observer.on_error(&AdapterError("boom".to_string()));
    assert!(observer.snapshot().errored);
}

#[test]
fn with_hook_forwards_every_chunk() {
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = Arc::clone(&seen);
    let observer = AggregatingObserver::with_hook(move |_chunk| {
        seen_clone.fetch_add(1, Ordering::SeqCst);
    });

    observer.on_chunk(&chunk(1, 1, false));
    observer.on_chunk(&chunk(2, 1, true));

    assert_eq!(seen.load(Ordering::SeqCst), 2);
    assert_eq!(observer.snapshot().chunk_count, 2);
}
