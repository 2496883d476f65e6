// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded FIFO execution pool (§4.4.2). A single worker drains a bounded
//! channel and spawns each accepted task; `Submit` itself never blocks —
//! it rejects immediately on a full queue or an exceeded fairness-key
//! reservation.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify};

use crate::error::PoolError;

type BoxedRun = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A unit of work submitted to the pool.
pub struct PoolTask {
    pub id: String,
    pub fairness_key: Option<String>,
    /// `0` means unbounded for this key.
    pub max_outstanding: u32,
    pub run: BoxedRun,
}

impl PoolTask {
    pub fn new(
        id: impl Into<String>,
        fairness_key: Option<String>,
        max_outstanding: u32,
        run: impl Future<Output = ()> + Send + 'static,
    ) -> Self {
        Self { id: id.into(), fairness_key, max_outstanding, run: Box::pin(run) }
    }

    fn key(&self) -> String {
        self.fairness_key.clone().unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PoolStats {
    pub submitted: u64,
    pub completed: u64,
    pub rejected: u64,
    pub rejected_by_concurrency: u64,
    pub in_flight: u64,
    pub queue_depth: u64,
}

struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
    rejected_by_concurrency: AtomicU64,
    in_flight: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            rejected_by_concurrency: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
        }
    }
}

/// Bounded worker pool with capacity `N` and per-fairness-key outstanding
/// limits.
pub struct ExecutionPool {
    capacity: usize,
    tx: mpsc::Sender<PoolTask>,
    outstanding: Arc<Mutex<HashMap<String, u32>>>,
    counters: Arc<Counters>,
    closed: Arc<AtomicBool>,
    idle: Arc<Notify>,
}

impl ExecutionPool {
    /// Spawn the pool's single worker task and return a handle to it.
    pub fn new(capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<PoolTask>(capacity.max(1));
        let outstanding: Arc<Mutex<HashMap<String, u32>>> = Arc::new(Mutex::new(HashMap::new()));
        let counters = Arc::new(Counters::default());
        let closed = Arc::new(AtomicBool::new(false));
        let idle = Arc::new(Notify::new());

        let worker_outstanding = Arc::clone(&outstanding);
        let worker_counters = Arc::clone(&counters);
        let worker_idle = Arc::clone(&idle);

        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let key = task.key();
                worker_counters.in_flight.fetch_add(1, Ordering::AcqRel);
                let run = task.run;
                let counters = Arc::clone(&worker_counters);
                let outstanding = Arc::clone(&worker_outstanding);
                let idle = Arc::clone(&worker_idle);
                tokio::spawn(async move {
                    run.await;
                    counters.completed.fetch_add(1, Ordering::AcqRel);
                    let still_in_flight = counters.in_flight.fetch_sub(1, Ordering::AcqRel) - 1;
                    let mut map = outstanding.lock().await;
                    if let Some(count) = map.get_mut(&key) {
                        *count = count.saturating_sub(1);
                        if *count == 0 {
                            map.remove(&key);
                        }
                    }
                    drop(map);
                    if still_in_flight == 0 {
                        idle.notify_waiters();
                    }
                });
            }
        });

        Self { capacity, tx, outstanding, counters, closed, idle }
    }

    /// Submit a task. Rejects with `NodeConcurrencyExceeded` if the task's
    /// fairness key is already at its `max_outstanding` budget, with
    /// `QueueFull` if the channel has no room, and with `Closed` once the
    /// pool has drained.
    pub async fn submit(&self, task: PoolTask) -> Result<(), PoolError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        let key = task.key();
        let max_outstanding = task.max_outstanding;
        {
            let mut map = self.outstanding.lock().await;
            let count = map.entry(key.clone()).or_insert(0);
            if max_outstanding != 0 && *count + 1 > max_outstanding {
                self.counters.rejected.fetch_add(1, Ordering::AcqRel);
                self.counters.rejected_by_concurrency.fetch_add(1, Ordering::AcqRel);
                return Err(PoolError::NodeConcurrencyExceeded);
            }
            *count += 1;
        }

        match self.tx.try_send(task) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Err(_) => {
                let mut map = self.outstanding.lock().await;
                if let Some(count) = map.get_mut(&key) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        map.remove(&key);
                    }
                }
                drop(map);
                self.counters.rejected.fetch_add(1, Ordering::AcqRel);
                Err(PoolError::QueueFull)
            }
        }
    }

    /// Wait until the queue is empty and no task is in-flight, then close
    /// the pool to further submissions. Honors `timeout`; on expiry returns
    /// without forcing in-flight tasks to terminate.
    pub async fn drain(&self, timeout: Duration) -> Result<(), DrainTimeoutError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.counters.in_flight.load(Ordering::Acquire) == 0 && self.tx.capacity() == self.capacity.max(1) {
                self.closed.store(true, Ordering::Release);
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(DrainTimeoutError);
            }
            let _ = tokio::time::timeout(remaining, self.idle.notified()).await;
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.counters.submitted.load(Ordering::Acquire),
            completed: self.counters.completed.load(Ordering::Acquire),
            rejected: self.counters.rejected.load(Ordering::Acquire),
            rejected_by_concurrency: self.counters.rejected_by_concurrency.load(Ordering::Acquire),
            in_flight: self.counters.in_flight.load(Ordering::Acquire),
            queue_depth: (self.capacity.max(1) - self.tx.capacity()) as u64,
        }
    }
}

/// `Drain` exceeded its deadline with the pool still busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainTimeoutError;

impl std::fmt::Display for DrainTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("drain deadline exceeded with tasks still outstanding")
    }
}

impl std::error::Error for DrainTimeoutError {}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
