// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default [`StreamObserver`] implementation: tallies chunk count and bytes,
//! records the first-chunk timestamp, and optionally forwards each chunk to
//! a caller-supplied hook (used by the streaming handoff orchestrator to
//! detect forward/final-fallback/supersede triggers).

use std::sync::Mutex;

use crate::ids::epoch_ms;

use super::{AdapterError, Outcome, StreamChunk, StreamObserver};

/// Point-in-time tally of a streaming invocation's progress.
#[derive(Debug, Clone, Default)]
pub struct StreamProgress {
    pub chunk_count: u64,
    pub total_bytes: u64,
    pub first_chunk_at_ms: Option<u64>,
    pub completed: bool,
    pub errored: bool,
}

/// Accumulates chunk/byte counts and first-chunk latency for one invocation.
pub struct AggregatingObserver {
    state: Mutex<StreamProgress>,
    on_chunk_hook: Option<Box<dyn Fn(&StreamChunk) + Send + Sync>>,
}

impl AggregatingObserver {
    pub fn new() -> Self {
        Self { state: Mutex::new(StreamProgress::default()), on_chunk_hook: None }
    }

    /// An observer that also forwards every chunk to `hook` — the streaming
    /// handoff orchestrator uses this to accumulate partial text per stage.
    pub fn with_hook(hook: impl Fn(&StreamChunk) + Send + Sync + 'static) -> Self {
        Self { state: Mutex::new(StreamProgress::default()), on_chunk_hook: Some(Box::new(hook)) }
    }

    pub fn snapshot(&self) -> StreamProgress {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner()).clone()
    }
}

impl Default for AggregatingObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamObserver for AggregatingObserver {
    fn on_start(&self) {}

    fn on_chunk(&self, chunk: &StreamChunk) {
        {
            let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
            state.chunk_count += 1;
            state.total_bytes += chunk.bytes_len as u64;
            if state.first_chunk_at_ms.is_none() {
                state.first_chunk_at_ms = Some(epoch_ms());
            }
        }
        if let Some(hook) = &self.on_chunk_hook {
            hook(chunk);
        }
    }

    fn on_complete(&self, _outcome: &Outcome) {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner()).completed = true;
    }

    fn on_error(&self, _err: &AdapterError) {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner()).errored = true;
    }
}

#[cfg(test)]
#[path = "streaming_tests.rs"]
mod tests;
