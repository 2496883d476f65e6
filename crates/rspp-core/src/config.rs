// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

/// Runtime configuration for the turn core. Environment variables are
/// operator fall-backs: when a `ResolvedTurnPlan` field is present it is
/// always authoritative over these (§6).
#[derive(Debug, Clone, Parser)]
#[command(name = "rspp-core", about = "Real-time speech pipeline turn runtime core")]
pub struct RuntimeConfig {
    /// Execution pool capacity (max in-flight tasks).
    #[arg(long, env = "RSPP_POOL_CAPACITY", default_value = "32")]
    pub pool_capacity: usize,

    /// Node lifecycle hook timeout in milliseconds.
    #[arg(long, env = "RSPP_HOOK_TIMEOUT_MS", default_value = "250")]
    pub hook_timeout_ms: u64,

    /// Baseline timeline ring buffer capacity (terminal outcomes).
    #[arg(long, env = "RSPP_TIMELINE_BASELINE_CAPACITY", default_value = "1024")]
    pub timeline_baseline_capacity: usize,

    /// Detail timeline ring buffer capacity (control signals).
    #[arg(long, env = "RSPP_TIMELINE_DETAIL_CAPACITY", default_value = "4096")]
    pub timeline_detail_capacity: usize,

    /// Attempt-evidence ring buffer capacity (per-provider-attempt records).
    #[arg(long, env = "RSPP_TIMELINE_ATTEMPT_CAPACITY", default_value = "2048")]
    pub timeline_attempt_capacity: usize,

    /// Snapshot ring buffer capacity (final invocation-result summaries).
    #[arg(long, env = "RSPP_TIMELINE_SNAPSHOT_CAPACITY", default_value = "256")]
    pub timeline_snapshot_capacity: usize,

    /// Per-record timeout for the durable timeline exporter.
    #[arg(long, env = "RSPP_TIMELINE_EXPORT_TIMEOUT_MS", default_value = "250")]
    pub timeline_export_timeout_ms: u64,

    /// Bounded retry count for one durable-export record before it is
    /// dropped and counted as failed.
    #[arg(long, env = "RSPP_TIMELINE_EXPORT_MAX_RETRIES", default_value = "3")]
    pub timeline_export_max_retries: u32,

    /// Bounded queue depth between the hot path and the durable-export
    /// worker; a full queue drops the record rather than blocking.
    #[arg(long, env = "RSPP_TIMELINE_EXPORT_QUEUE_CAPACITY", default_value = "256")]
    pub timeline_export_queue_capacity: usize,

    /// Force provider streaming on/off globally (`RSPP_PROVIDER_STREAMING_ENABLE`
    /// / `RSPP_PROVIDER_STREAMING_DISABLE`); per-modality variants override it.
    #[arg(long, env = "RSPP_PROVIDER_STREAMING_ENABLE")]
    pub provider_streaming_enable: bool,
    #[arg(long, env = "RSPP_PROVIDER_STREAMING_DISABLE")]
    pub provider_streaming_disable: bool,
    #[arg(long, env = "RSPP_PROVIDER_STREAMING_ENABLE_STT")]
    pub provider_streaming_enable_stt: bool,
    #[arg(long, env = "RSPP_PROVIDER_STREAMING_DISABLE_STT")]
    pub provider_streaming_disable_stt: bool,
    #[arg(long, env = "RSPP_PROVIDER_STREAMING_ENABLE_LLM")]
    pub provider_streaming_enable_llm: bool,
    #[arg(long, env = "RSPP_PROVIDER_STREAMING_DISABLE_LLM")]
    pub provider_streaming_disable_llm: bool,
    #[arg(long, env = "RSPP_PROVIDER_STREAMING_ENABLE_TTS")]
    pub provider_streaming_enable_tts: bool,
    #[arg(long, env = "RSPP_PROVIDER_STREAMING_DISABLE_TTS")]
    pub provider_streaming_disable_tts: bool,

    /// Streaming handoff defaults, used only when the resolved plan carries
    /// no `streamingHandoff` policy.
    #[arg(long, env = "RSPP_ORCH_STREAM_HANDOFF_ENABLE", default_value = "true")]
    pub stream_handoff_enable: bool,
    #[arg(long, env = "RSPP_ORCH_STREAM_HANDOFF_STT_LLM_ENABLE", default_value = "true")]
    pub stream_handoff_stt_llm_enable: bool,
    #[arg(long, env = "RSPP_ORCH_STREAM_HANDOFF_LLM_TTS_ENABLE", default_value = "true")]
    pub stream_handoff_llm_tts_enable: bool,
    #[arg(long, env = "RSPP_ORCH_STREAM_HANDOFF_MIN_PARTIAL_CHARS", default_value = "8")]
    pub stream_handoff_min_partial_chars: usize,
    #[arg(long, env = "RSPP_ORCH_STREAM_HANDOFF_MAX_PENDING_REVISIONS", default_value = "4")]
    pub stream_handoff_max_pending_revisions: usize,
    #[arg(long, env = "RSPP_ORCH_STREAM_HANDOFF_COALESCE_LATEST_ONLY", default_value = "true")]
    pub stream_handoff_coalesce_latest_only: bool,

    /// Default candidate cap and attempt caps for the provider controller,
    /// used when no `resolvedProviderPlan` overrides them.
    #[arg(long, env = "RSPP_MAX_CANDIDATE_PROVIDERS", default_value = "5")]
    pub max_candidate_providers: usize,
    #[arg(long, env = "RSPP_MAX_ATTEMPTS_PER_PROVIDER", default_value = "2")]
    pub max_attempts_per_provider: u32,

    /// Log format (json or text).
    #[arg(long, env = "RSPP_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "RSPP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl RuntimeConfig {
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }

    pub fn timeline_export_timeout(&self) -> Duration {
        Duration::from_millis(self.timeline_export_timeout_ms)
    }

    /// Resolve the effective streaming-enabled flag for a modality, given
    /// the adapter's own capability flag. Precedence: per-modality disable
    /// > per-modality enable > global disable > global enable > adapter
    /// default.
    pub fn streaming_enabled_for(&self, modality: &str, adapter_supports_streaming: bool) -> bool {
        let (enable, disable) = match modality {
            "stt" => (self.provider_streaming_enable_stt, self.provider_streaming_disable_stt),
            "llm" => (self.provider_streaming_enable_llm, self.provider_streaming_disable_llm),
            "tts" => (self.provider_streaming_enable_tts, self.provider_streaming_disable_tts),
            _ => (false, false),
        };
        if disable {
            return false;
        }
        if enable {
            return true;
        }
        if self.provider_streaming_disable {
            return false;
        }
        if self.provider_streaming_enable {
            return true;
        }
        adapter_supports_streaming
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        // clap::Parser::parse_from(&[] as &[&str]) would fail without a
        // program name; build directly from defaults instead.
        Self {
            pool_capacity: 32,
            hook_timeout_ms: 250,
            timeline_baseline_capacity: 1024,
            timeline_detail_capacity: 4096,
            timeline_attempt_capacity: 2048,
            timeline_snapshot_capacity: 256,
            timeline_export_timeout_ms: 250,
            timeline_export_max_retries: 3,
            timeline_export_queue_capacity: 256,
            provider_streaming_enable: false,
            provider_streaming_disable: false,
            provider_streaming_enable_stt: false,
            provider_streaming_disable_stt: false,
            provider_streaming_enable_llm: false,
            provider_streaming_disable_llm: false,
            provider_streaming_enable_tts: false,
            provider_streaming_disable_tts: false,
            stream_handoff_enable: true,
            stream_handoff_stt_llm_enable: true,
            stream_handoff_llm_tts_enable: true,
            stream_handoff_min_partial_chars: 8,
            stream_handoff_max_pending_revisions: 4,
            stream_handoff_coalesce_latest_only: true,
            max_candidate_providers: 5,
            max_attempts_per_provider: 2,
            log_format: "json".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
