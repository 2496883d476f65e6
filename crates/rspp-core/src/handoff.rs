// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming handoff orchestrator (C6): overlaps STT→LLM and LLM→TTS to
//! reduce first-audio latency. A disabled [`StreamingHandoffPolicy`] means
//! the caller simply runs the three stages sequentially and never
//! constructs a [`HandoffOrchestrator`] — this module only implements the
//! enabled overlap path: forward/final_fallback/supersede trigger detection
//! per edge, two bounded handoff queues guarded by a shared mutex (message
//! passing, not cyclic callbacks, per the design notes), and the derived
//! latency summary.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::ids::new_id;
use crate::model::{ControlSignal, Scope, SequenceTriple, StreamingHandoffPolicy};
use crate::telemetry::{Correlation, MetricSample, TelemetrySink};

/// One of the two overlap edges in the STT→LLM→TTS chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    SttToLlm,
    LlmToTts,
}

impl Edge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SttToLlm => "stt_to_llm",
            Self::LlmToTts => "llm_to_tts",
        }
    }
}

/// Why a handoff was forwarded downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffAction {
    Forward,
    FinalFallback,
    Supersede,
}

impl HandoffAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::FinalFallback => "final_fallback",
            Self::Supersede => "supersede",
        }
    }
}

/// Evidence recorded for one handoff actually consumed by the downstream
/// stage.
#[derive(Debug, Clone)]
pub struct HandoffEdgeResult {
    pub handoff_id: String,
    pub edge: Edge,
    pub upstream_revision: u64,
    pub action: HandoffAction,
    pub partial_accepted_at_ms: u64,
    pub downstream_started_at_ms: u64,
    pub handoff_latency_ms: u64,
    pub queue_depth: usize,
    pub watermark_high: bool,
}

/// A trigger delivered to the downstream stage: its recorded evidence plus
/// the text the stage should act on.
#[derive(Debug, Clone)]
pub struct HandoffDelivery {
    pub result: HandoffEdgeResult,
    pub text: String,
}

/// Detects when an accumulating partial (or the stage's final text) should
/// cross a handoff edge, per §4.6: forward once the partial reaches
/// `minPartialChars` or ends in a sentence terminator; on final, emit
/// `final_fallback` if nothing was forwarded yet, or `supersede` if the
/// final text differs from what was forwarded.
struct PartialTracker {
    min_partial_chars: usize,
    forwarded_text: Option<String>,
    revision: u64,
}

impl PartialTracker {
    fn new(min_partial_chars: usize) -> Self {
        Self { min_partial_chars, forwarded_text: None, revision: 0 }
    }

    fn on_partial(&mut self, accumulated: &str) -> Option<(u64, HandoffAction, String)> {
        if self.forwarded_text.is_some() {
            return None;
        }
        let ends_terminal = accumulated.ends_with(['.', '!', '?']);
        if accumulated.chars().count() < self.min_partial_chars && !ends_terminal {
            return None;
        }
        self.revision += 1;
        self.forwarded_text = Some(accumulated.to_string());
        Some((self.revision, HandoffAction::Forward, accumulated.to_string()))
    }

    fn on_final(&mut self, final_text: &str) -> Option<(u64, HandoffAction, String)> {
        match &self.forwarded_text {
            None => {
                self.revision += 1;
                Some((self.revision, HandoffAction::FinalFallback, final_text.to_string()))
            }
            Some(prev) if prev != final_text => {
                self.revision += 1;
                Some((self.revision, HandoffAction::Supersede, final_text.to_string()))
            }
            Some(_) => None,
        }
    }
}

struct PendingTrigger {
    revision: u64,
    action: HandoffAction,
    text: String,
    partial_accepted_at_ms: u64,
}

struct HandoffQueueInner {
    items: VecDeque<PendingTrigger>,
    capacity: usize,
    coalesce_latest_only: bool,
    coalesce_count: u64,
    above_watermark: bool,
    closed: bool,
}

struct DequeueOutcome {
    trigger: PendingTrigger,
    queue_depth: usize,
    watermark_high: bool,
}

struct EnqueueOutcome {
    xoff: bool,
    xon: bool,
}

/// A bounded handoff channel (capacity = `maxPendingRevisions`), shared
/// between the upstream producer and the downstream consumer under one
/// mutex per §5's "message passing for overlap" guidance — not a cyclic
/// callback.
struct HandoffQueue {
    inner: Mutex<HandoffQueueInner>,
    notify: Notify,
}

impl HandoffQueue {
    fn new(capacity: usize, coalesce_latest_only: bool) -> Self {
        Self {
            inner: Mutex::new(HandoffQueueInner {
                items: VecDeque::new(),
                capacity: capacity.max(1),
                coalesce_latest_only,
                coalesce_count: 0,
                above_watermark: false,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue `trigger`. If the queue is already at capacity: coalesces
    /// (drops the most recently queued trigger, enqueues the new one,
    /// increments `coalesceCount`) when `coalesceLatestOnly`, otherwise the
    /// new trigger is simply skipped. Returns the xoff/xon transitions the
    /// caller should turn into control signals.
    async fn enqueue(&self, trigger: PendingTrigger) -> EnqueueOutcome {
        let mut inner = self.inner.lock().await;
        let saturated = inner.items.len() >= inner.capacity;
        let mut xoff = false;
        let mut xon = false;

        if saturated {
            if inner.coalesce_latest_only {
                inner.items.pop_back();
                inner.coalesce_count += 1;
                inner.items.push_back(trigger);
            }
            if !inner.above_watermark {
                inner.above_watermark = true;
                xoff = true;
            }
        } else {
            inner.items.push_back(trigger);
            if inner.above_watermark {
                inner.above_watermark = false;
                xon = true;
            }
        }
        drop(inner);
        self.notify.notify_one();
        EnqueueOutcome { xoff, xon }
    }

    /// Wait for and remove the oldest trigger. Returns `None` once the
    /// queue is closed and drained.
    async fn dequeue(&self) -> Option<DequeueOutcome> {
        loop {
            let mut inner = self.inner.lock().await;
            if let Some(trigger) = inner.items.pop_front() {
                let queue_depth = inner.items.len();
                let watermark_high = inner.above_watermark;
                return Some(DequeueOutcome { trigger, queue_depth, watermark_high });
            }
            if inner.closed {
                return None;
            }
            drop(inner);
            self.notify.notified().await;
        }
    }

    async fn close(&self) {
        self.inner.lock().await.closed = true;
        self.notify.notify_waiters();
    }

    async fn coalesce_count(&self) -> u64 {
        self.inner.lock().await.coalesce_count
    }
}

#[derive(Debug, Clone, Default)]
struct Timestamps {
    stt_first_chunk_ms: Option<u64>,
    llm_start_ms: Option<u64>,
    llm_first_chunk_ms: Option<u64>,
    tts_start_ms: Option<u64>,
    tts_first_chunk_ms: Option<u64>,
    tts_complete_ms: Option<u64>,
}

/// Derived end-to-end and per-edge latencies, per §4.6.
#[derive(Debug, Clone, Default)]
pub struct LatencySummary {
    pub stt_first_partial_ms: Option<u64>,
    pub llm_first_partial_ms: Option<u64>,
    pub tts_first_audio_ms: Option<u64>,
    pub first_assistant_audio_e2e_ms: Option<u64>,
    pub turn_completion_e2e_ms: Option<u64>,
    pub stt_partial_to_llm_start_latency_ms: Option<u64>,
    pub llm_partial_to_tts_start_latency_ms: Option<u64>,
}

/// Coordinates the overlap between STT, LLM, and TTS stages for one turn.
/// Owns no stage execution itself — the caller's STT/LLM/TTS drivers report
/// progress in (`report_*`) and pull forwarded work out (`next_*`).
pub struct HandoffOrchestrator {
    session_id: String,
    turn_id: String,
    authority_epoch: u64,
    turn_start_ms: u64,
    policy: StreamingHandoffPolicy,
    stt_to_llm: HandoffQueue,
    llm_to_tts: HandoffQueue,
    stt_tracker: Mutex<PartialTracker>,
    llm_tracker: Mutex<PartialTracker>,
    timestamps: Mutex<Timestamps>,
    results: Mutex<Vec<HandoffEdgeResult>>,
    signals: Mutex<Vec<ControlSignal>>,
    seq: AtomicU64,
    telemetry: Arc<dyn TelemetrySink>,
}

impl HandoffOrchestrator {
    /// `policy.enabled` is the caller's responsibility to check — this
    /// type only implements the overlap path.
    pub fn new(
        policy: StreamingHandoffPolicy,
        session_id: impl Into<String>,
        turn_id: impl Into<String>,
        authority_epoch: u64,
        turn_start_ms: u64,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let stt_to_llm = HandoffQueue::new(policy.max_pending_revisions, policy.coalesce_latest_only);
        let llm_to_tts = HandoffQueue::new(policy.max_pending_revisions, policy.coalesce_latest_only);
        let min_partial_chars = policy.min_partial_chars;
        Self {
            session_id: session_id.into(),
            turn_id: turn_id.into(),
            authority_epoch,
            turn_start_ms,
            policy,
            stt_to_llm,
            llm_to_tts,
            stt_tracker: Mutex::new(PartialTracker::new(min_partial_chars)),
            llm_tracker: Mutex::new(PartialTracker::new(min_partial_chars)),
            timestamps: Mutex::new(Timestamps::default()),
            results: Mutex::new(Vec::new()),
            signals: Mutex::new(Vec::new()),
            seq: AtomicU64::new(0),
            telemetry,
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::AcqRel)
    }

    async fn emit_edge_signal(&self, name: &'static str, edge: Edge, now_ms: u64) {
        let sequence = SequenceTriple { transport_sequence: None, runtime_sequence: self.next_seq(), wall_clock_ms: now_ms };
        let signal = ControlSignal::new(name, "RK-25", format!("edge={}", edge.as_str()), Scope::Turn, self.authority_epoch, sequence);
        self.signals.lock().await.push(signal);
    }

    fn queue_for(&self, edge: Edge) -> &HandoffQueue {
        match edge {
            Edge::SttToLlm => &self.stt_to_llm,
            Edge::LlmToTts => &self.llm_to_tts,
        }
    }

    async fn enqueue(&self, edge: Edge, revision: u64, action: HandoffAction, text: String, now_ms: u64) {
        let trigger = PendingTrigger { revision, action, text, partial_accepted_at_ms: now_ms };
        let outcome = self.queue_for(edge).enqueue(trigger).await;
        if outcome.xoff {
            self.emit_edge_signal("xoff", edge, now_ms).await;
        }
        if outcome.xon {
            self.emit_edge_signal("xon", edge, now_ms).await;
        }
    }

    /// STT reported an accumulated partial transcript.
    pub async fn report_stt_chunk(&self, accumulated_text: &str, now_ms: u64) {
        {
            let mut ts = self.timestamps.lock().await;
            if ts.stt_first_chunk_ms.is_none() {
                ts.stt_first_chunk_ms = Some(now_ms);
            }
        }
        if !self.policy.stt_to_llm_enabled {
            return;
        }
        let decision = self.stt_tracker.lock().await.on_partial(accumulated_text);
        if let Some((revision, action, text)) = decision {
            self.enqueue(Edge::SttToLlm, revision, action, text, now_ms).await;
        }
    }

    /// STT reached its final transcript.
    pub async fn report_stt_final(&self, final_text: &str, now_ms: u64) {
        if !self.policy.stt_to_llm_enabled {
            return;
        }
        let decision = self.stt_tracker.lock().await.on_final(final_text);
        if let Some((revision, action, text)) = decision {
            self.enqueue(Edge::SttToLlm, revision, action, text, now_ms).await;
        }
        self.stt_to_llm.close().await;
    }

    /// LLM reported an accumulated partial response.
    pub async fn report_llm_chunk(&self, accumulated_text: &str, now_ms: u64) {
        {
            let mut ts = self.timestamps.lock().await;
            if ts.llm_first_chunk_ms.is_none() {
                ts.llm_first_chunk_ms = Some(now_ms);
            }
        }
        if !self.policy.llm_to_tts_enabled {
            return;
        }
        let decision = self.llm_tracker.lock().await.on_partial(accumulated_text);
        if let Some((revision, action, text)) = decision {
            self.enqueue(Edge::LlmToTts, revision, action, text, now_ms).await;
        }
    }

    /// LLM reached its final response text.
    pub async fn report_llm_final(&self, final_text: &str, now_ms: u64) {
        if !self.policy.llm_to_tts_enabled {
            return;
        }
        let decision = self.llm_tracker.lock().await.on_final(final_text);
        if let Some((revision, action, text)) = decision {
            self.enqueue(Edge::LlmToTts, revision, action, text, now_ms).await;
        }
        self.llm_to_tts.close().await;
    }

    /// TTS stage is about to start consuming LLM output.
    pub async fn mark_tts_start(&self, now_ms: u64) {
        let mut ts = self.timestamps.lock().await;
        if ts.tts_start_ms.is_none() {
            ts.tts_start_ms = Some(now_ms);
        }
    }

    /// TTS emitted its first audio chunk.
    pub async fn report_tts_chunk(&self, now_ms: u64) {
        let mut ts = self.timestamps.lock().await;
        if ts.tts_first_chunk_ms.is_none() {
            ts.tts_first_chunk_ms = Some(now_ms);
        }
    }

    /// TTS completed the turn's audio.
    pub async fn mark_tts_complete(&self, now_ms: u64) {
        self.timestamps.lock().await.tts_complete_ms = Some(now_ms);
    }

    async fn record_delivery(&self, edge: Edge, outcome: DequeueOutcome, downstream_started_at_ms: u64) -> HandoffDelivery {
        let handoff_latency_ms = downstream_started_at_ms.saturating_sub(outcome.trigger.partial_accepted_at_ms);
        let result = HandoffEdgeResult {
            handoff_id: new_id(),
            edge,
            upstream_revision: outcome.trigger.revision,
            action: outcome.trigger.action,
            partial_accepted_at_ms: outcome.trigger.partial_accepted_at_ms,
            downstream_started_at_ms,
            handoff_latency_ms,
            queue_depth: outcome.queue_depth,
            watermark_high: outcome.watermark_high,
        };

        let mut tags = BTreeMap::new();
        tags.insert("edge_id".to_string(), edge.as_str().to_string());
        tags.insert("action".to_string(), outcome.trigger.action.as_str().to_string());
        tags.insert("watermark_high".to_string(), result.watermark_high.to_string());
        self.telemetry.emit_metric(
            &Correlation { session_id: self.session_id.clone(), turn_id: Some(self.turn_id.clone()), event_id: None },
            MetricSample { name: "edge_latency_ms", value: handoff_latency_ms as f64, tags },
        );

        self.results.lock().await.push(result.clone());
        HandoffDelivery { result, text: outcome.trigger.text }
    }

    /// LLM-side consumer: pulls the next forwarded STT trigger, if any.
    pub async fn next_stt_to_llm(&self, now_ms: u64) -> Option<HandoffDelivery> {
        {
            let mut ts = self.timestamps.lock().await;
            if ts.llm_start_ms.is_none() {
                ts.llm_start_ms = Some(now_ms);
            }
        }
        let outcome = self.stt_to_llm.dequeue().await?;
        Some(self.record_delivery(Edge::SttToLlm, outcome, now_ms).await)
    }

    /// TTS-side consumer: pulls the next forwarded LLM trigger, if any.
    pub async fn next_llm_to_tts(&self, now_ms: u64) -> Option<HandoffDelivery> {
        let outcome = self.llm_to_tts.dequeue().await?;
        Some(self.record_delivery(Edge::LlmToTts, outcome, now_ms).await)
    }

    /// Snapshot of every handoff consumed so far.
    pub async fn results(&self) -> Vec<HandoffEdgeResult> {
        self.results.lock().await.clone()
    }

    /// Control signals (`xoff`/`xon`) accumulated so far, draining the list.
    pub async fn take_signals(&self) -> Vec<ControlSignal> {
        std::mem::take(&mut *self.signals.lock().await)
    }

    /// How many triggers were dropped to coalescing, per edge.
    pub async fn coalesce_counts(&self) -> (u64, u64) {
        (self.stt_to_llm.coalesce_count().await, self.llm_to_tts.coalesce_count().await)
    }

    /// The derived latency summary named in §4.6.
    pub async fn latency_summary(&self) -> LatencySummary {
        let ts = self.timestamps.lock().await.clone();
        let results = self.results.lock().await;

        let min_positive = |edge: Edge| -> Option<u64> {
            results.iter().filter(|r| r.edge == edge && r.handoff_latency_ms > 0).map(|r| r.handoff_latency_ms).min()
        };

        LatencySummary {
            stt_first_partial_ms: ts.stt_first_chunk_ms.map(|c| c.saturating_sub(self.turn_start_ms)),
            llm_first_partial_ms: match (ts.llm_first_chunk_ms, ts.llm_start_ms) {
                (Some(c), Some(s)) => Some(c.saturating_sub(s)),
                _ => None,
            },
            tts_first_audio_ms: match (ts.tts_first_chunk_ms, ts.tts_start_ms) {
                (Some(c), Some(s)) => Some(c.saturating_sub(s)),
                _ => None,
            },
            first_assistant_audio_e2e_ms: ts.tts_first_chunk_ms.map(|c| c.saturating_sub(self.turn_start_ms)),
            turn_completion_e2e_ms: ts.tts_complete_ms.map(|c| c.saturating_sub(self.turn_start_ms)),
            stt_partial_to_llm_start_latency_ms: min_positive(Edge::SttToLlm),
            llm_partial_to_tts_start_latency_ms: min_positive(Edge::LlmToTts),
        }
    }
}

#[cfg(test)]
#[path = "handoff_tests.rs"]
mod tests;
