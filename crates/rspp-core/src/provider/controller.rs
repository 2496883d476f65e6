// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The deterministic attempt loop (§4.5): resolve a candidate list, attempt
//! each provider up to its per-provider cap, retry/switch/fallback per the
//! allowed adaptive actions, and emit `provider_error`/`circuit_event`/
//! `provider_switch` control signals along the way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::ids::provider_invocation_id as build_provider_invocation_id;
use crate::model::{normalize_sequence, AdaptiveAction, ControlSignal, Scope, SequenceTriple};
use crate::telemetry::{Correlation, MetricSample, TelemetrySink};

use super::{InvocationAttempt, InvocationRequest, Modality, Outcome, StreamingAdapter};

/// Policy snapshot carried by the resolved plan for one invocation series:
/// an ordered candidate list plus per-attempt/total budgets. When absent,
/// the controller ranks the catalog by preferred provider and falls back
/// to the controller's own default caps.
#[derive(Debug, Clone, Default)]
pub struct ResolvedProviderPlan {
    pub ordered_candidates: Vec<String>,
    pub max_attempts_per_provider: Option<u32>,
    pub max_total_attempts: Option<u32>,
    pub max_total_latency_ms: Option<u64>,
}

/// Catalog of known adapters for a modality, consulted when no resolved
/// provider plan supplies an explicit candidate order.
#[derive(Default)]
pub struct CandidateCatalog {
    adapters: Vec<Arc<dyn StreamingAdapter>>,
}

impl CandidateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn StreamingAdapter>) {
        self.adapters.push(adapter);
    }

    fn get(&self, id: &str) -> Option<Arc<dyn StreamingAdapter>> {
        self.adapters.iter().find(|a| a.id() == id).cloned()
    }

    fn for_modality(&self, modality: Modality) -> Vec<Arc<dyn StreamingAdapter>> {
        self.adapters.iter().filter(|a| a.modality() == modality).cloned().collect()
    }

    /// Preferred provider first (if it serves the modality), then catalog
    /// registration order, capped at `max`.
    fn ranked(&self, modality: Modality, preferred: Option<&str>, max: usize) -> Vec<Arc<dyn StreamingAdapter>> {
        let mut candidates = self.for_modality(modality);
        if let Some(pref) = preferred {
            if let Some(pos) = candidates.iter().position(|a| a.id() == pref) {
                let preferred_adapter = candidates.remove(pos);
                candidates.insert(0, preferred_adapter);
            }
        }
        candidates.truncate(max.max(1));
        candidates
    }

    /// Plan-ordered candidates: preserve plan order, drop unknown ids,
    /// dedupe by id.
    fn from_plan_order(&self, order: &[String]) -> Vec<Arc<dyn StreamingAdapter>> {
        let mut out: Vec<Arc<dyn StreamingAdapter>> = Vec::new();
        for id in order {
            if out.iter().any(|a| a.id() == id) {
                continue;
            }
            if let Some(adapter) = self.get(id) {
                out.push(adapter);
            }
        }
        out
    }
}

/// Controller-wide defaults, used when a `ResolvedProviderPlan` doesn't
/// override them.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub max_candidate_providers: usize,
    pub max_attempts_per_provider: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { max_candidate_providers: 5, max_attempts_per_provider: 2 }
    }
}

/// Input to one `invoke` call.
#[derive(Debug, Clone)]
pub struct InvocationInput {
    pub session_id: String,
    pub turn_id: Option<String>,
    pub event_id: String,
    pub modality: Modality,
    pub preferred_provider: Option<String>,
    pub allowed_adaptive_actions: Vec<AdaptiveAction>,
    pub pipeline_version: String,
    pub authority_epoch: u64,
    pub cancel_requested: bool,
    pub provider_invocation_id: Option<String>,
    pub resolved_provider_plan: Option<ResolvedProviderPlan>,
}

/// The full result of one `invoke` call: selection, terminal outcome, every
/// attempt made, the retry-cascade decision that led there, and the control
/// signals emitted along the way (already sequence-normalized).
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub provider_invocation_id: String,
    pub selected_provider: Option<String>,
    pub outcome: Outcome,
    pub attempts: Vec<InvocationAttempt>,
    pub retry_decision: Option<&'static str>,
    pub signals: Vec<ControlSignal>,
}

/// Deterministic attempt-loop driver (§4.5).
pub struct ProviderController {
    catalog: CandidateCatalog,
    config: ControllerConfig,
    telemetry: Arc<dyn TelemetrySink>,
    seq: AtomicU64,
}

impl ProviderController {
    pub fn new(catalog: CandidateCatalog, config: ControllerConfig, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self { catalog, config, telemetry, seq: AtomicU64::new(0) }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::AcqRel)
    }

    fn emit_signal(&self, signal: &str, reason: String, authority_epoch: u64, now_ms: u64) -> ControlSignal {
        let sequence = SequenceTriple { transport_sequence: None, runtime_sequence: self.next_seq(), wall_clock_ms: now_ms };
        ControlSignal::new(signal, "RK-25", reason, Scope::Turn, authority_epoch, sequence)
    }

    /// Run the full candidate/attempt cascade for one invocation. Cancels
    /// immediately (no attempts, no signals) if `input.cancel_requested`.
    pub async fn invoke(&self, input: &InvocationInput) -> InvocationResult {
        let provider_invocation_id = input.provider_invocation_id.clone().unwrap_or_else(|| {
            build_provider_invocation_id(
                &input.session_id,
                input.turn_id.as_deref().unwrap_or(&input.session_id),
                &input.event_id,
                input.modality.as_str(),
            )
        });

        if input.cancel_requested {
            return InvocationResult {
                provider_invocation_id,
                selected_provider: None,
                outcome: Outcome::cancelled_before_invoke(),
                attempts: Vec::new(),
                retry_decision: None,
                signals: Vec::new(),
            };
        }

        let candidates = match &input.resolved_provider_plan {
            Some(plan) if !plan.ordered_candidates.is_empty() => self.catalog.from_plan_order(&plan.ordered_candidates),
            _ => self.catalog.ranked(input.modality, input.preferred_provider.as_deref(), self.config.max_candidate_providers),
        };

        let max_attempts_per_provider = input
            .resolved_provider_plan
            .as_ref()
            .and_then(|p| p.max_attempts_per_provider)
            .unwrap_or(self.config.max_attempts_per_provider)
            .max(1);
        let max_total_attempts = input.resolved_provider_plan.as_ref().and_then(|p| p.max_total_attempts);
        let max_total_latency_ms = input.resolved_provider_plan.as_ref().and_then(|p| p.max_total_latency_ms);

        let allowed = &input.allowed_adaptive_actions;
        let mut attempts: Vec<InvocationAttempt> = Vec::new();
        let mut signals: Vec<ControlSignal> = Vec::new();
        let mut total_latency_ms: u64 = 0;
        let mut retry_decision: Option<&'static str> = None;
        let mut final_outcome: Option<Outcome> = None;
        let mut selected_provider: Option<String> = None;

        let correlation =
            Correlation { session_id: input.session_id.clone(), turn_id: input.turn_id.clone(), event_id: Some(input.event_id.clone()) };

        'providers: for (candidate_idx, adapter) in candidates.iter().enumerate() {
            let mut attempt_num: u32 = 0;
            loop {
                attempt_num += 1;
                if let Some(cap) = max_total_attempts {
                    if attempts.len() as u32 >= cap {
                        break 'providers;
                    }
                }
                if let Some(cap) = max_total_latency_ms {
                    if total_latency_ms >= cap {
                        break 'providers;
                    }
                }

                let req = InvocationRequest {
                    provider_invocation_id: provider_invocation_id.clone(),
                    session_id: input.session_id.clone(),
                    turn_id: input.turn_id.clone(),
                    event_id: input.event_id.clone(),
                    modality: input.modality,
                    provider_id: adapter.id().to_string(),
                    attempt: attempt_num,
                    retry_budget_remaining: max_attempts_per_provider.saturating_sub(attempt_num),
                    allowed_adaptive_actions: allowed.clone(),
                    pipeline_version: input.pipeline_version.clone(),
                    authority_epoch: input.authority_epoch,
                };

                let started = Instant::now();
                let invoke_result = adapter.invoke(&req).await;
                let latency_ms = started.elapsed().as_millis() as u64;
                total_latency_ms += latency_ms;

                let outcome = match invoke_result {
                    Ok(o) => o,
                    Err(_err) => Outcome::infrastructure_failure("adapter_invoke_error"),
                };

                self.telemetry.emit_metric(
                    &correlation,
                    MetricSample {
                        name: "provider_rtt_ms",
                        value: latency_ms as f64,
                        tags: std::collections::BTreeMap::from([
                            ("provider".to_string(), adapter.id().to_string()),
                            ("modality".to_string(), input.modality.as_str().to_string()),
                        ]),
                    },
                );
                self.telemetry.emit_span(&correlation, "provider_invocation_span", latency_ms);
                self.telemetry.emit_log(
                    &correlation,
                    tracing::Level::DEBUG,
                    &format!("provider={} attempt={} outcome={}", adapter.id(), attempt_num, outcome.class.as_str()),
                );

                attempts.push(InvocationAttempt { provider_id: adapter.id().to_string(), attempt: attempt_num, outcome: outcome.clone(), latency_ms });

                if outcome.class.is_success() {
                    final_outcome = Some(outcome);
                    selected_provider = Some(adapter.id().to_string());
                    break 'providers;
                }

                let now_ms = crate::ids::epoch_ms();
                signals.push(self.emit_signal(
                    "provider_error",
                    format!("provider={} class={} reason={}", adapter.id(), outcome.class.as_str(), outcome.reason),
                    input.authority_epoch,
                    now_ms,
                ));
                if outcome.circuit_open {
                    signals.push(self.emit_signal(
                        "circuit_event",
                        format!("provider={} circuit_open=true", adapter.id()),
                        input.authority_epoch,
                        now_ms,
                    ));
                }

                let retry_allowed =
                    outcome.retryable && allowed.contains(&AdaptiveAction::Retry) && attempt_num < max_attempts_per_provider;
                if retry_allowed {
                    retry_decision = Some("retry");
                    continue;
                }
                break;
            }

            let has_next = candidate_idx + 1 < candidates.len();
            let can_switch = allowed.contains(&AdaptiveAction::ProviderSwitch) || allowed.contains(&AdaptiveAction::Fallback);
            if has_next && can_switch {
                let next_id = candidates[candidate_idx + 1].id().to_string();
                let now_ms = crate::ids::epoch_ms();
                signals.push(self.emit_signal(
                    "provider_switch",
                    format!("from={} to={next_id}", adapter.id()),
                    input.authority_epoch,
                    now_ms,
                ));
                retry_decision =
                    Some(if allowed.contains(&AdaptiveAction::ProviderSwitch) { "provider_switch" } else { "fallback" });
                continue 'providers;
            } else {
                break 'providers;
            }
        }

        let outcome = final_outcome.unwrap_or_else(|| {
            attempts.last().map(|a| a.outcome.clone()).unwrap_or_else(|| Outcome::infrastructure_failure("no_candidate_providers"))
        });

        normalize_sequence(&mut signals);

        InvocationResult { provider_invocation_id, selected_provider, outcome, attempts, retry_decision, signals }
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
