// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use super::outcome::Scope;
use super::plan::Lane;

/// Monotonic sequence triple carried by every control signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceTriple {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_sequence: Option<u64>,
    pub runtime_sequence: u64,
    pub wall_clock_ms: u64,
}

/// Schema-versioned metadata carried on the control lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSignal {
    pub signal: String,
    pub emitted_by: String,
    pub reason: String,
    pub event_scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lane: Option<Lane>,
    pub sequence: SequenceTriple,
    pub runtime_timestamp_ms: u64,
    pub authority_epoch: u64,
}

impl ControlSignal {
    pub fn new(
        signal: impl Into<String>,
        emitted_by: impl Into<String>,
        reason: impl Into<String>,
        event_scope: Scope,
        authority_epoch: u64,
        sequence: SequenceTriple,
    ) -> Self {
        Self {
            signal: signal.into(),
            emitted_by: emitted_by.into(),
            reason: reason.into(),
            event_scope,
            lane: None,
            sequence,
            runtime_timestamp_ms: sequence.runtime_sequence,
            authority_epoch,
        }
    }

    pub fn with_lane(mut self, lane: Lane) -> Self {
        self.lane = Some(lane);
        self
    }
}

/// Re-stamp a batch of signals so `(runtime_sequence, runtime_timestamp_ms,
/// wall_clock_ms, transport_sequence)` are each non-decreasing, per §4.4.6.
/// A violated field is bumped to `prev + 1`.
pub fn normalize_sequence(signals: &mut [ControlSignal]) {
    let mut prev_runtime_seq: Option<u64> = None;
    let mut prev_runtime_ts: Option<u64> = None;
    let mut prev_wall_clock: Option<u64> = None;
    let mut prev_transport_seq: Option<u64> = None;

    for signal in signals.iter_mut() {
        if let Some(prev) = prev_runtime_seq {
            if signal.sequence.runtime_sequence < prev {
                signal.sequence.runtime_sequence = prev + 1;
            }
        }
        prev_runtime_seq = Some(signal.sequence.runtime_sequence);

        if let Some(prev) = prev_runtime_ts {
            if signal.runtime_timestamp_ms < prev {
                signal.runtime_timestamp_ms = prev + 1;
            }
        }
        prev_runtime_ts = Some(signal.runtime_timestamp_ms);

        if let Some(prev) = prev_wall_clock {
            if signal.sequence.wall_clock_ms < prev {
                signal.sequence.wall_clock_ms = prev + 1;
            }
        }
        prev_wall_clock = Some(signal.sequence.wall_clock_ms);

        if let Some(transport) = signal.sequence.transport_sequence {
            if let Some(prev) = prev_transport_seq {
                if transport < prev {
                    signal.sequence.transport_sequence = Some(prev + 1);
                }
            }
            prev_transport_seq = signal.sequence.transport_sequence;
        }
    }
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
