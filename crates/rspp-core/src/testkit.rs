// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: in-memory fakes for every external-interface
//! capability trait named in §6, so module tests never need a real
//! transport, control-plane client, or provider backend.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::lifecycle::{LeaseBackend, LeaseResolution, LeaseResolveInput};
use crate::provider::{Adapter, AdapterError, InvocationRequest, Modality, Outcome};
use crate::timeline::{ExportError, TimelineDurableExporter, TimelineRecord};

/// An [`Adapter`] that returns a fixed, pre-scripted sequence of outcomes,
/// one per call to `invoke`; the last scripted outcome repeats once the
/// script is exhausted. Records every request it was handed.
pub struct FakeAdapter {
    id: String,
    modality: Modality,
    script: Mutex<Vec<Outcome>>,
    calls: Mutex<Vec<InvocationRequest>>,
    next: AtomicUsize,
}

impl FakeAdapter {
    pub fn new(id: impl Into<String>, modality: Modality, script: Vec<Outcome>) -> Self {
        Self { id: id.into(), modality, script: Mutex::new(script), calls: Mutex::new(Vec::new()), next: AtomicUsize::new(0) }
    }

    /// An adapter that always succeeds.
    pub fn always_succeeds(id: impl Into<String>, modality: Modality) -> Self {
        Self::new(id, modality, vec![Outcome::success("ok")])
    }

    /// An adapter that always reports an `infrastructure_failure`.
    pub fn always_fails(id: impl Into<String>, modality: Modality, reason: impl Into<String>) -> Self {
        Self::new(id, modality, vec![Outcome::infrastructure_failure(reason.into())])
    }

    pub fn calls(&self) -> Vec<InvocationRequest> {
        self.calls.lock().unwrap_or_else(|poison| poison.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|poison| poison.into_inner()).len()
    }
}

impl Adapter for FakeAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn modality(&self) -> Modality {
        self.modality
    }

    fn invoke<'a>(
        &'a self,
        req: &'a InvocationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Outcome, AdapterError>> + Send + 'a>> {
        self.calls.lock().unwrap_or_else(|poison| poison.into_inner()).push(req.clone());
        let script = self.script.lock().unwrap_or_else(|poison| poison.into_inner());
        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        let outcome = script.get(idx.min(script.len().saturating_sub(1))).cloned();
        Box::pin(async move {
            match outcome {
                Some(outcome) => Ok(outcome),
                None => Err(AdapterError("fake adapter has no scripted outcome".to_string())),
            }
        })
    }
}

/// A [`LeaseBackend`] that always resolves with the fixed facts it was
/// constructed with, regardless of the request presented.
pub struct FakeLeaseBackend {
    resolution: LeaseResolution,
}

impl FakeLeaseBackend {
    pub fn new(resolution: LeaseResolution) -> Self {
        Self { resolution }
    }

    /// A backend that authorizes every request at the given epoch.
    pub fn authorized(authority_epoch: u64) -> Self {
        Self::new(LeaseResolution {
            authority_epoch,
            authority_epoch_valid: true,
            authority_authorized: true,
            lease_token_id: "fake-lease".to_string(),
            lease_expires_at_utc: "2099-01-01T00:00:00Z".to_string(),
            lease_resolution_snapshot: "fake-snapshot".to_string(),
        })
    }

    /// A backend that always reports a stale authority epoch.
    pub fn stale_epoch(claimed: u64, actual: u64) -> Self {
        Self::new(LeaseResolution {
            authority_epoch: actual,
            authority_epoch_valid: actual == claimed,
            authority_authorized: false,
            lease_token_id: "fake-lease".to_string(),
            lease_expires_at_utc: "2099-01-01T00:00:00Z".to_string(),
            lease_resolution_snapshot: "fake-snapshot".to_string(),
        })
    }
}

impl LeaseBackend for FakeLeaseBackend {
    fn resolve<'a>(
        &'a self,
        _input: &'a LeaseResolveInput,
    ) -> Pin<Box<dyn Future<Output = LeaseResolution> + Send + 'a>> {
        let resolution = self.resolution.clone();
        Box::pin(async move { resolution })
    }
}

/// A [`TimelineDurableExporter`] that appends every record it is handed to
/// an in-memory log, for assertions on what the hot path attempted to
/// export. Never fails unless constructed with `fail_after`.
#[derive(Default)]
pub struct RecordingDurableExporter {
    records: Mutex<Vec<TimelineRecord>>,
    fail_after: Option<usize>,
}

impl RecordingDurableExporter {
    pub fn new() -> Self {
        Self { records: Mutex::new(Vec::new()), fail_after: None }
    }

    /// An exporter that fails every export starting at the `n`th call
    /// (0-indexed), useful for exercising the durable-export retry path.
    pub fn failing_after(n: usize) -> Self {
        Self { records: Mutex::new(Vec::new()), fail_after: Some(n) }
    }

    pub fn recorded(&self) -> Vec<TimelineRecord> {
        self.records.lock().unwrap_or_else(|poison| poison.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|poison| poison.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TimelineDurableExporter for RecordingDurableExporter {
    fn export<'a>(
        &'a self,
        record: &'a TimelineRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + 'a>> {
        let mut records = self.records.lock().unwrap_or_else(|poison| poison.into_inner());
        let should_fail = self.fail_after.is_some_and(|n| records.len() >= n);
        records.push(record.clone());
        Box::pin(async move {
            if should_fail {
                Err(ExportError("recording exporter configured to fail".to_string()))
            } else {
                Ok(())
            }
        })
    }
}

#[cfg(test)]
#[path = "testkit_tests.rs"]
mod tests;
