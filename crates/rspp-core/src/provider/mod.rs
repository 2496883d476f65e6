// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider invocation controller (C5): a deterministic attempt loop over a
//! candidate list of providers, with retry budget, provider-switch cascade,
//! and streaming observer support. The concrete STT/LLM/TTS/external
//! adapters are consumed only through the narrow [`Adapter`] /
//! [`StreamingAdapter`] capability traits — this module never depends on a
//! concrete backend.

pub mod controller;
pub mod streaming;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::model::AdaptiveAction;

/// The modality a provider serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Stt,
    Llm,
    Tts,
    External,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stt => "stt",
            Self::Llm => "llm",
            Self::Tts => "tts",
            Self::External => "external",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome class a provider adapter reports (§7, taxonomy kind 5). Only
/// `Success` and `Cancelled` are excluded from failure shaping by C4 and
/// from the retry cascade by C5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    Success,
    Timeout,
    Overload,
    InfrastructureFailure,
    Blocked,
    Cancelled,
}

impl OutcomeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::Overload => "overload",
            Self::InfrastructureFailure => "infrastructure_failure",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A single provider invocation's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub class: OutcomeClass,
    pub retryable: bool,
    pub reason: String,
    #[serde(default)]
    pub circuit_open: bool,
}

impl Outcome {
    pub fn success(reason: impl Into<String>) -> Self {
        Self { class: OutcomeClass::Success, retryable: false, reason: reason.into(), circuit_open: false }
    }

    pub fn cancelled_before_invoke() -> Self {
        Self {
            class: OutcomeClass::Cancelled,
            retryable: false,
            reason: "cancel_requested_before_invoke".to_string(),
            circuit_open: false,
        }
    }

    pub fn infrastructure_failure(reason: impl Into<String>) -> Self {
        Self { class: OutcomeClass::InfrastructureFailure, retryable: true, reason: reason.into(), circuit_open: false }
    }
}

/// One attempt's request, built fresh for each provider/attempt pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub provider_invocation_id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
    pub event_id: String,
    pub modality: Modality,
    pub provider_id: String,
    pub attempt: u32,
    pub retry_budget_remaining: u32,
    pub allowed_adaptive_actions: Vec<AdaptiveAction>,
    pub pipeline_version: String,
    pub authority_epoch: u64,
}

/// Evidence captured for one attempt, regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationAttempt {
    pub provider_id: String,
    pub attempt: u32,
    pub latency_ms: u64,
    pub outcome: Outcome,
}

/// Error surfaced by an adapter's `invoke`/`invoke_stream` call itself
/// (distinct from a reported `Outcome` — this is a transport/protocol
/// failure talking to the adapter, always synthesized into an
/// `infrastructure_failure` outcome by the controller).
#[derive(Debug, Clone)]
pub struct AdapterError(pub String);

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for AdapterError {}

type BoxedOutcomeFuture<'a> = Pin<Box<dyn Future<Output = Result<Outcome, AdapterError>> + Send + 'a>>;

/// A provider backend, consumed only through this capability seam.
pub trait Adapter: Send + Sync {
    fn id(&self) -> &str;
    fn modality(&self) -> Modality;
    fn invoke<'a>(&'a self, req: &'a InvocationRequest) -> BoxedOutcomeFuture<'a>;
}

/// A single streamed chunk forwarded to a [`StreamObserver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub sequence: u64,
    pub bytes_len: usize,
    pub text: Option<String>,
    #[serde(rename = "final")]
    pub is_final: bool,
}

/// Observer contract for a streaming invocation (§4.5): first-chunk time,
/// chunk/byte tallies, and terminal callbacks. Every chunk is validated
/// (via `StreamChunk`'s own field shape) before being delegated.
pub trait StreamObserver: Send + Sync {
    fn on_start(&self) {}
    fn on_chunk(&self, chunk: &StreamChunk);
    fn on_complete(&self, outcome: &Outcome) {
        let _ = outcome;
    }
    fn on_error(&self, err: &AdapterError) {
        let _ = err;
    }
}

/// An adapter that can additionally stream. Deliberately not a supertrait
/// of [`Adapter`] (trait-object upcasting is not assumed available) — every
/// method `Adapter` has is repeated here so the provider controller can
/// hold a single uniform `Arc<dyn StreamingAdapter>` candidate list.
/// `invoke_stream` still resolves to a final terminal `Outcome` once the
/// stream completes or errors.
pub trait StreamingAdapter: Send + Sync {
    fn id(&self) -> &str;
    fn modality(&self) -> Modality;
    fn invoke<'a>(&'a self, req: &'a InvocationRequest) -> BoxedOutcomeFuture<'a>;

    fn invoke_stream<'a>(
        &'a self,
        req: &'a InvocationRequest,
        observer: std::sync::Arc<dyn StreamObserver>,
    ) -> BoxedOutcomeFuture<'a>;

    /// Whether this adapter supports native streaming at all (as opposed to
    /// being wrapped with a unary-only fallback via [`UnaryOnly`]).
    fn supports_streaming(&self) -> bool {
        true
    }
}

/// Adapts a plain [`Adapter`] into a [`StreamingAdapter`] whose
/// `invoke_stream` simply falls back to unary `invoke`, reporting
/// `supports_streaming() == false`. Lets the provider controller hold one
/// uniform candidate list regardless of which adapters actually stream.
pub struct UnaryOnly<A>(pub std::sync::Arc<A>);

impl<A: Adapter> StreamingAdapter for UnaryOnly<A> {
    fn id(&self) -> &str {
        self.0.id()
    }

    fn modality(&self) -> Modality {
        self.0.modality()
    }

    fn invoke<'a>(&'a self, req: &'a InvocationRequest) -> BoxedOutcomeFuture<'a> {
        self.0.invoke(req)
    }

    fn invoke_stream<'a>(
        &'a self,
        req: &'a InvocationRequest,
        observer: std::sync::Arc<dyn StreamObserver>,
    ) -> BoxedOutcomeFuture<'a> {
        observer.on_start();
        self.0.invoke(req)
    }

    fn supports_streaming(&self) -> bool {
        false
    }
}

pub use controller::{
    CandidateCatalog, ControllerConfig, InvocationResult, ProviderController, ResolvedProviderPlan,
};
pub use streaming::{AggregatingObserver, StreamProgress};
