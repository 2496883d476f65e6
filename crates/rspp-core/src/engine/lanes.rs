// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lane-scheduler regime (§4.4.1): per-lane bounded queues dispatched in
//! strict `Control > Data > Telemetry` order, derived from the resolved
//! plan's `flowControl`. A queue's hard capacity is its high watermark when
//! shedding is enabled for that lane (unbounded otherwise) — the plan names
//! no separate per-lane capacity field, so the watermark doubles as the
//! shed threshold named in §4.4.1.

use std::collections::VecDeque;

use crate::model::{FlowControlPolicy, Lane, LaneFlowControl};

/// Watermark crossing observed by an `enqueue`/`dequeue` call, consumed by
/// the caller to emit the supplemented `lane_watermark_high`/`_low` signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkTransition {
    None,
    CrossedHigh,
    CrossedLow,
}

/// The lane's hard capacity was exceeded; the caller sheds with reason
/// `lane_queue_capacity_exceeded` (terminal for Data/Control, non-blocking
/// for Telemetry per `Lane::overflow_is_blocking`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneOverflow;

/// A single lane's bounded FIFO queue with watermark tracking.
pub struct LaneQueue {
    lane: Lane,
    capacity: usize,
    high_watermark: usize,
    low_watermark: usize,
    items: VecDeque<String>,
    above_high: bool,
}

impl LaneQueue {
    pub fn new(lane: Lane, flow: &LaneFlowControl) -> Self {
        let capacity = if flow.shedding_enabled { flow.high_watermark } else { usize::MAX };
        Self { lane, capacity, high_watermark: flow.high_watermark, low_watermark: flow.low_watermark, items: VecDeque::new(), above_high: false }
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Enqueue `item`, returning the watermark transition crossed (if any),
    /// or `Err(LaneOverflow)` if the lane is already at hard capacity.
    pub fn enqueue(&mut self, item: String) -> Result<WatermarkTransition, LaneOverflow> {
        if self.items.len() >= self.capacity {
            return Err(LaneOverflow);
        }
        self.items.push_back(item);
        if !self.above_high && self.items.len() >= self.high_watermark {
            self.above_high = true;
            return Ok(WatermarkTransition::CrossedHigh);
        }
        Ok(WatermarkTransition::None)
    }

    /// Dequeue the oldest item, returning the low-watermark transition if
    /// draining below it reverses a prior high-watermark crossing.
    pub fn dequeue(&mut self) -> (Option<String>, WatermarkTransition) {
        let item = self.items.pop_front();
        if self.above_high && self.items.len() <= self.low_watermark {
            self.above_high = false;
            return (item, WatermarkTransition::CrossedLow);
        }
        (item, WatermarkTransition::None)
    }
}

/// Three per-lane queues dispatched in strict priority order.
pub struct LaneScheduler {
    control: LaneQueue,
    data: LaneQueue,
    telemetry: LaneQueue,
}

impl LaneScheduler {
    pub fn from_flow_control(fc: &FlowControlPolicy) -> Self {
        Self {
            control: LaneQueue::new(Lane::Control, &fc.control),
            data: LaneQueue::new(Lane::Data, &fc.data),
            telemetry: LaneQueue::new(Lane::Telemetry, &fc.telemetry),
        }
    }

    fn queue_mut(&mut self, lane: Lane) -> &mut LaneQueue {
        match lane {
            Lane::Control => &mut self.control,
            Lane::Data => &mut self.data,
            Lane::Telemetry => &mut self.telemetry,
        }
    }

    pub fn queue(&self, lane: Lane) -> &LaneQueue {
        match lane {
            Lane::Control => &self.control,
            Lane::Data => &self.data,
            Lane::Telemetry => &self.telemetry,
        }
    }

    pub fn enqueue(&mut self, lane: Lane, item: String) -> Result<WatermarkTransition, LaneOverflow> {
        self.queue_mut(lane).enqueue(item)
    }

    /// Dispatch the next ready item in `Control > Data > Telemetry` order.
    pub fn dispatch_next(&mut self) -> Option<(Lane, String, WatermarkTransition)> {
        for lane in [Lane::Control, Lane::Data, Lane::Telemetry] {
            let queue = self.queue_mut(lane);
            if !queue.is_empty() {
                let (item, transition) = queue.dequeue();
                if let Some(item) = item {
                    return Some((lane, item, transition));
                }
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.control.is_empty() && self.data.is_empty() && self.telemetry.is_empty()
    }
}

#[cfg(test)]
#[path = "lanes_tests.rs"]
mod tests;
