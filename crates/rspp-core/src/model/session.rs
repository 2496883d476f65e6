// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

/// Session-hot state: a mutex-protected, epoch-gated string→value map.
/// Writes must present the session's current `authorityEpoch`; a write
/// carrying a stale epoch is rejected rather than silently applied.
#[derive(Default)]
pub struct SessionHot {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl SessionHot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values.read().await.get(key).cloned()
    }

    /// Write `key = value` if `epoch` matches `current_epoch`. Returns
    /// `false` (no write performed) when the epoch is stale.
    pub async fn set_if_current(
        &self,
        key: &str,
        value: serde_json::Value,
        epoch: u64,
        current_epoch: u64,
    ) -> bool {
        if epoch != current_epoch {
            return false;
        }
        self.values.write().await.insert(key.to_string(), value);
        true
    }
}

/// A session owns turns and an authority epoch. Session identity (`sessionID`,
/// `tenantID`, `pipelineVersion`) is fixed at creation; `authorityEpoch` is
/// the only mutable field, advanced monotonically by the control plane.
pub struct Session {
    pub session_id: String,
    pub tenant_id: String,
    pub pipeline_version: String,
    authority_epoch: AtomicU64,
    pub hot: SessionHot,
}

impl Session {
    pub fn new(session_id: impl Into<String>, tenant_id: impl Into<String>, pipeline_version: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            tenant_id: tenant_id.into(),
            pipeline_version: pipeline_version.into(),
            authority_epoch: AtomicU64::new(0),
            hot: SessionHot::new(),
        }
    }

    pub fn authority_epoch(&self) -> u64 {
        self.authority_epoch.load(Ordering::Acquire)
    }

    /// Advance the authority epoch. Returns `false` (no-op) if `next` is not
    /// strictly greater than the current epoch — the epoch is monotonic.
    pub fn advance_epoch(&self, next: u64) -> bool {
        let current = self.authority_epoch.load(Ordering::Acquire);
        if next <= current {
            return false;
        }
        self.authority_epoch.store(next, Ordering::Release);
        true
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
