// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::model::outcome::{Emitter, OutcomeKind, Phase, Scope};
use crate::model::signal::SequenceTriple;
use crate::provider::OutcomeClass;

fn sample_outcome() -> DecisionOutcome {
    DecisionOutcome {
        kind: OutcomeKind::Admit,
        phase: Phase::PreTurn,
        scope: Scope::Session,
        emitter: Emitter::Rk24,
        session_id: "sess-1".to_string(),
        turn_id: None,
        event_id: "evt-1".to_string(),
        runtime_timestamp_ms: 1,
        wall_clock_ms: 1,
        timestamp_ms: None,
        authority_epoch: Some(1),
        reason: "ok".to_string(),
    }
}

fn sample_signal(runtime_sequence: u64) -> ControlSignal {
    ControlSignal::new(
        "lane_watermark_high",
        "engine",
        "queue_depth_exceeded",
        Scope::Session,
        1,
        SequenceTriple { transport_sequence: None, runtime_sequence, wall_clock_ms: runtime_sequence },
    )
}

fn sample_attempt() -> InvocationAttempt {
    InvocationAttempt {
        provider_id: "prov-a".to_string(),
        attempt: 1,
        latency_ms: 12,
        outcome: Outcome::success("ok"),
    }
}

#[test]
fn ring_buffer_evicts_oldest_past_capacity() {
    let mut ring = RingBuffer::new(2);
    ring.push(1);
    ring.push(2);
    ring.push(3);
    assert_eq!(ring.to_vec(), vec![2, 3]);
    assert_eq!(ring.evicted(), 1);
}

#[test]
fn ring_buffer_capacity_floor_is_one() {
    let mut ring: RingBuffer<i32> = RingBuffer::new(0);
    ring.push(1);
    ring.push(2);
    assert_eq!(ring.len(), 1);
}

#[test]
fn recorder_append_and_snapshot_round_trip() {
    let config = RuntimeConfig::default();
    let recorder = TimelineRecorder::new(&config);
    recorder.record_outcome(sample_outcome());
    recorder.record_signal(sample_signal(1));
    recorder.record_attempt(sample_attempt());
    recorder.record_snapshot(InvocationSnapshot {
        provider_invocation_id: "inv-1".to_string(),
        selected_provider: Some("prov-a".to_string()),
        outcome: Outcome::success("ok"),
        attempt_count: 1,
        retry_decision: None,
    });

    assert_eq!(recorder.baseline_snapshot().len(), 1);
    assert_eq!(recorder.detail_snapshot().len(), 1);
    assert_eq!(recorder.attempt_snapshot().len(), 1);
    assert_eq!(recorder.snapshot_snapshot().len(), 1);

    let stats = recorder.stats();
    assert_eq!(stats.baseline_len, 1);
    assert_eq!(stats.detail_len, 1);
    assert_eq!(stats.attempt_len, 1);
    assert_eq!(stats.snapshot_len, 1);
    assert_eq!(stats.baseline_evicted, 0);
}

#[test]
fn recorder_rings_respect_configured_capacity() {
    let mut config = RuntimeConfig::default();
    config.timeline_baseline_capacity = 1;
    let recorder = TimelineRecorder::new(&config);
    recorder.record_outcome(sample_outcome());
    recorder.record_outcome(sample_outcome());
    assert_eq!(recorder.baseline_snapshot().len(), 1);
    assert_eq!(recorder.stats().baseline_evicted, 1);
}

#[tokio::test]
async fn null_exporter_never_fails() {
    let exporter = NullDurableExporter;
    let record = TimelineRecord::Baseline(sample_outcome());
    assert!(exporter.export(&record).await.is_ok());
}

#[tokio::test]
async fn channel_exporter_republishes_records_to_subscribers() {
    let (exporter, mut rx) = ChannelDurableExporter::new(4);
    let record = TimelineRecord::Attempt(sample_attempt());
    exporter.export(&record).await.unwrap();
    let received = rx.recv().await.unwrap();
    match received {
        TimelineRecord::Attempt(attempt) => assert_eq!(attempt.provider_id, "prov-a"),
        other => panic!("unexpected record kind: {other:?}"),
    }
}

struct CountingExporter {
    calls: Arc<AtomicUsize>,
    fail_first_n: usize,
}

impl TimelineDurableExporter for CountingExporter {
    fn export<'a>(&'a self, _record: &'a TimelineRecord) -> BoxedExportFuture<'a> {
        let count = self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if count < self.fail_first_n {
                Err(ExportError("transient".to_string()))
            } else {
                Ok(())
            }
        })
    }
}

#[tokio::test]
async fn background_worker_retries_then_succeeds() {
    let calls = Arc::new(AtomicUsize::new(0));
    let exporter: Arc<dyn TimelineDurableExporter> =
        Arc::new(CountingExporter { calls: Arc::clone(&calls), fail_first_n: 1 });
    let mut config = RuntimeConfig::default();
    config.timeline_export_max_retries = 3;
    config.timeline_export_timeout_ms = 200;
    let recorder = TimelineRecorder::with_exporter(&config, exporter);

    recorder.record_outcome(sample_outcome());

    let mut waited = 0;
    while calls.load(Ordering::SeqCst) < 2 && waited < 50 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        waited += 1;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn background_worker_gives_up_after_max_retries_and_counts_failure() {
    let calls = Arc::new(AtomicUsize::new(0));
    let exporter: Arc<dyn TimelineDurableExporter> =
        Arc::new(CountingExporter { calls: Arc::clone(&calls), fail_first_n: 100 });
    let mut config = RuntimeConfig::default();
    config.timeline_export_max_retries = 2;
    config.timeline_export_timeout_ms = 200;
    let recorder = TimelineRecorder::with_exporter(&config, exporter);

    recorder.record_outcome(sample_outcome());

    let mut waited = 0;
    while recorder.stats().export_failed == 0 && waited < 50 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        waited += 1;
    }
    assert_eq!(recorder.stats().export_failed, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn full_export_queue_drops_and_counts_instead_of_blocking() {
    let calls = Arc::new(AtomicUsize::new(0));
    let exporter: Arc<dyn TimelineDurableExporter> = Arc::new(CountingExporter { calls, fail_first_n: 0 });
    let mut config = RuntimeConfig::default();
    config.timeline_export_queue_capacity = 1;
    let recorder = TimelineRecorder::with_exporter(&config, exporter);

    for _ in 0..64 {
        recorder.record_outcome(sample_outcome());
    }

    assert!(recorder.stats().export_dropped > 0);
}
