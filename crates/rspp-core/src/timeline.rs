// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timeline recorder & telemetry seam (C8): three bounded ring buffers
//! (baseline decision outcomes, detail control signals, per-provider-attempt
//! evidence) plus an optional snapshot ring summarizing the final
//! invocation result for a turn. Appends are lock-protected, non-blocking,
//! and O(1); overflow evicts the oldest entry rather than growing.
//!
//! An optional durable exporter runs on a background single-worker queue
//! (message passing, not a callback) with a per-record timeout and bounded
//! retry. A full export queue drops the record and counts it — the hot path
//! never blocks on exporter health.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::config::RuntimeConfig;
use crate::model::{ControlSignal, DecisionOutcome};
use crate::provider::{InvocationAttempt, Outcome};

/// A fixed-capacity FIFO ring: pushing past capacity evicts the oldest
/// entry. Tracks how many entries have been evicted over the buffer's
/// lifetime so callers can detect lossy history.
#[derive(Debug)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    evicted: u64,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self { items: VecDeque::with_capacity(capacity.min(1024)), capacity: capacity.max(1), evicted: 0 }
    }

    /// Push `item`, evicting the oldest entry first if already at capacity.
    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
            self.evicted += 1;
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Snapshot every currently-retained entry, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

/// Summary of one provider invocation's final result, recorded in the
/// optional snapshot ring.
#[derive(Debug, Clone)]
pub struct InvocationSnapshot {
    pub provider_invocation_id: String,
    pub selected_provider: Option<String>,
    pub outcome: Outcome,
    pub attempt_count: usize,
    pub retry_decision: Option<&'static str>,
}

/// One record handed to the durable exporter. Mirrors the three evidence
/// rings plus the snapshot ring, tagged so an exporter can route by kind.
#[derive(Debug, Clone)]
pub enum TimelineRecord {
    Baseline(DecisionOutcome),
    Detail(ControlSignal),
    Attempt(InvocationAttempt),
    Snapshot(InvocationSnapshot),
}

/// A durable-export failure. Never propagated to the hot path — only
/// logged and counted by the background worker.
#[derive(Debug, Clone)]
pub struct ExportError(pub String);

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ExportError {}

type BoxedExportFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + 'a>>;

/// Best-effort durable exporter seam (§6), consumed only through this
/// narrow capability trait — the concrete sink (object storage, a log
/// pipeline, a message bus) lives entirely outside the core.
pub trait TimelineDurableExporter: Send + Sync {
    fn export<'a>(&'a self, record: &'a TimelineRecord) -> BoxedExportFuture<'a>;
}

/// An exporter that discards every record. The default when no durable
/// export is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDurableExporter;

impl TimelineDurableExporter for NullDurableExporter {
    fn export<'a>(&'a self, _record: &'a TimelineRecord) -> BoxedExportFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// An exporter that republishes every record onto a broadcast channel,
/// letting an embedding application subscribe without implementing a real
/// durable sink — grounded on the aggregator's broadcast-feed pattern.
pub struct ChannelDurableExporter {
    tx: broadcast::Sender<TimelineRecord>,
}

impl ChannelDurableExporter {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<TimelineRecord>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl TimelineDurableExporter for ChannelDurableExporter {
    fn export<'a>(&'a self, record: &'a TimelineRecord) -> BoxedExportFuture<'a> {
        let record = record.clone();
        Box::pin(async move {
            // No active subscriber is not an export failure — the channel
            // is a best-effort fan-out, not a guaranteed-delivery sink.
            let _ = self.tx.send(record);
            Ok(())
        })
    }
}

/// Point-in-time counters for every ring plus the durable-export path.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimelineStats {
    pub baseline_len: usize,
    pub baseline_evicted: u64,
    pub detail_len: usize,
    pub detail_evicted: u64,
    pub attempt_len: usize,
    pub attempt_evicted: u64,
    pub snapshot_len: usize,
    pub snapshot_evicted: u64,
    pub export_dropped: u64,
    pub export_succeeded: u64,
    pub export_failed: u64,
}

struct ExportCounters {
    dropped: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl Default for ExportCounters {
    fn default() -> Self {
        Self { dropped: AtomicU64::new(0), succeeded: AtomicU64::new(0), failed: AtomicU64::new(0) }
    }
}

/// In-memory evidence rings (§4.8) plus an optional best-effort durable
/// export path. One recorder per session is the expected shape; every
/// append is a single short-held `std::sync::Mutex` critical section with
/// no `.await` inside it, so it never contends with the async runtime.
pub struct TimelineRecorder {
    baseline: Mutex<RingBuffer<DecisionOutcome>>,
    detail: Mutex<RingBuffer<ControlSignal>>,
    attempt: Mutex<RingBuffer<InvocationAttempt>>,
    snapshot: Mutex<RingBuffer<InvocationSnapshot>>,
    export_tx: Option<mpsc::Sender<TimelineRecord>>,
    export_counters: Arc<ExportCounters>,
}

impl TimelineRecorder {
    /// A recorder with only the in-memory rings — no durable export.
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            baseline: Mutex::new(RingBuffer::new(config.timeline_baseline_capacity)),
            detail: Mutex::new(RingBuffer::new(config.timeline_detail_capacity)),
            attempt: Mutex::new(RingBuffer::new(config.timeline_attempt_capacity)),
            snapshot: Mutex::new(RingBuffer::new(config.timeline_snapshot_capacity)),
            export_tx: None,
            export_counters: Arc::new(ExportCounters::default()),
        }
    }

    /// A recorder additionally wired to a durable exporter via a bounded
    /// background queue. `exporter` runs on its own single-worker task with
    /// `config.timeline_export_timeout_ms` per attempt and
    /// `config.timeline_export_max_retries` bounded retries before a
    /// record is dropped and counted as failed.
    pub fn with_exporter(config: &RuntimeConfig, exporter: Arc<dyn TimelineDurableExporter>) -> Self {
        let (tx, rx) = mpsc::channel(config.timeline_export_queue_capacity.max(1));
        let counters = Arc::new(ExportCounters::default());
        spawn_export_worker(rx, exporter, config.timeline_export_timeout(), config.timeline_export_max_retries, Arc::clone(&counters));
        Self {
            baseline: Mutex::new(RingBuffer::new(config.timeline_baseline_capacity)),
            detail: Mutex::new(RingBuffer::new(config.timeline_detail_capacity)),
            attempt: Mutex::new(RingBuffer::new(config.timeline_attempt_capacity)),
            snapshot: Mutex::new(RingBuffer::new(config.timeline_snapshot_capacity)),
            export_tx: Some(tx),
            export_counters: counters,
        }
    }

    fn try_export(&self, record: TimelineRecord) {
        let Some(tx) = &self.export_tx else { return };
        if tx.try_send(record).is_err() {
            self.export_counters.dropped.fetch_add(1, Ordering::AcqRel);
            tracing::debug!("timeline export queue full, dropping record");
        }
    }

    pub fn record_outcome(&self, outcome: DecisionOutcome) {
        self.try_export(TimelineRecord::Baseline(outcome.clone()));
        self.baseline.lock().unwrap_or_else(|poison| poison.into_inner()).push(outcome);
    }

    pub fn record_signal(&self, signal: ControlSignal) {
        self.try_export(TimelineRecord::Detail(signal.clone()));
        self.detail.lock().unwrap_or_else(|poison| poison.into_inner()).push(signal);
    }

    pub fn record_signals(&self, signals: impl IntoIterator<Item = ControlSignal>) {
        for signal in signals {
            self.record_signal(signal);
        }
    }

    pub fn record_attempt(&self, attempt: InvocationAttempt) {
        self.try_export(TimelineRecord::Attempt(attempt.clone()));
        self.attempt.lock().unwrap_or_else(|poison| poison.into_inner()).push(attempt);
    }

    pub fn record_snapshot(&self, snapshot: InvocationSnapshot) {
        self.try_export(TimelineRecord::Snapshot(snapshot.clone()));
        self.snapshot.lock().unwrap_or_else(|poison| poison.into_inner()).push(snapshot);
    }

    pub fn baseline_snapshot(&self) -> Vec<DecisionOutcome> {
        self.baseline.lock().unwrap_or_else(|poison| poison.into_inner()).to_vec()
    }

    pub fn detail_snapshot(&self) -> Vec<ControlSignal> {
        self.detail.lock().unwrap_or_else(|poison| poison.into_inner()).to_vec()
    }

    pub fn attempt_snapshot(&self) -> Vec<InvocationAttempt> {
        self.attempt.lock().unwrap_or_else(|poison| poison.into_inner()).to_vec()
    }

    pub fn snapshot_snapshot(&self) -> Vec<InvocationSnapshot> {
        self.snapshot.lock().unwrap_or_else(|poison| poison.into_inner()).to_vec()
    }

    pub fn stats(&self) -> TimelineStats {
        let baseline = self.baseline.lock().unwrap_or_else(|poison| poison.into_inner());
        let detail = self.detail.lock().unwrap_or_else(|poison| poison.into_inner());
        let attempt = self.attempt.lock().unwrap_or_else(|poison| poison.into_inner());
        let snapshot = self.snapshot.lock().unwrap_or_else(|poison| poison.into_inner());
        TimelineStats {
            baseline_len: baseline.len(),
            baseline_evicted: baseline.evicted(),
            detail_len: detail.len(),
            detail_evicted: detail.evicted(),
            attempt_len: attempt.len(),
            attempt_evicted: attempt.evicted(),
            snapshot_len: snapshot.len(),
            snapshot_evicted: snapshot.evicted(),
            export_dropped: self.export_counters.dropped.load(Ordering::Acquire),
            export_succeeded: self.export_counters.succeeded.load(Ordering::Acquire),
            export_failed: self.export_counters.failed.load(Ordering::Acquire),
        }
    }
}

fn spawn_export_worker(
    mut rx: mpsc::Receiver<TimelineRecord>,
    exporter: Arc<dyn TimelineDurableExporter>,
    per_record_timeout: Duration,
    max_retries: u32,
    counters: Arc<ExportCounters>,
) {
    let max_retries = max_retries.max(1);
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                let outcome = tokio::time::timeout(per_record_timeout, exporter.export(&record)).await;
                let retry_remaining = attempt < max_retries;
                match outcome {
                    Ok(Ok(())) => {
                        counters.succeeded.fetch_add(1, Ordering::AcqRel);
                        break;
                    }
                    Ok(Err(err)) if retry_remaining => {
                        tracing::warn!(attempt, error = %err, "timeline export attempt failed, retrying");
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(attempt, error = %err, "timeline export failed, giving up");
                        counters.failed.fetch_add(1, Ordering::AcqRel);
                        break;
                    }
                    Err(_) if retry_remaining => {
                        tracing::warn!(attempt, "timeline export attempt timed out, retrying");
                    }
                    Err(_) => {
                        tracing::warn!(attempt, "timeline export timed out, giving up");
                        counters.failed.fetch_add(1, Ordering::AcqRel);
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "timeline_tests.rs"]
mod tests;
