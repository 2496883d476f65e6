// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observability sink seam. The core never depends on a concrete metrics or
//! logging backend — it calls through these narrow traits, matching the
//! teacher's `Detector`/`NudgeEncoder` capability-trait shape. The default
//! telemetry slot forwards into `tracing`; it is a swap-in seam, not a
//! dependency, per the design notes on context-passing in lieu of globals.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Correlation identifiers threaded through every emission so sinks can
/// join metrics/spans/logs back to a session/turn/event.
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    pub session_id: String,
    pub turn_id: Option<String>,
    pub event_id: Option<String>,
}

/// A metric observation: name, value, and string tags.
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub name: &'static str,
    pub value: f64,
    pub tags: BTreeMap<String, String>,
}

pub trait MetricSink: Send + Sync {
    fn emit_metric(&self, correlation: &Correlation, sample: MetricSample);
}

pub trait SpanSink: Send + Sync {
    fn emit_span(&self, correlation: &Correlation, name: &'static str, duration_ms: u64);
}

pub trait LogSink: Send + Sync {
    fn emit_log(&self, correlation: &Correlation, level: tracing::Level, message: &str);
}

/// Bundles the three sinks behind one handle so components take a single
/// `Arc<dyn TelemetrySink>` rather than three separate trait objects.
pub trait TelemetrySink: MetricSink + SpanSink + LogSink {}
impl<T: MetricSink + SpanSink + LogSink> TelemetrySink for T {}

/// Default sink: forwards every emission into `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricSink for TracingSink {
    fn emit_metric(&self, correlation: &Correlation, sample: MetricSample) {
        tracing::info!(
            metric = sample.name,
            value = sample.value,
            tags = ?sample.tags,
            session_id = %correlation.session_id,
            turn_id = ?correlation.turn_id,
            "metric"
        );
    }
}

impl SpanSink for TracingSink {
    fn emit_span(&self, correlation: &Correlation, name: &'static str, duration_ms: u64) {
        tracing::info!(
            span = name,
            duration_ms,
            session_id = %correlation.session_id,
            turn_id = ?correlation.turn_id,
            "span"
        );
    }
}

impl LogSink for TracingSink {
    fn emit_log(&self, correlation: &Correlation, level: tracing::Level, message: &str) {
        match level {
            tracing::Level::ERROR => tracing::error!(session_id = %correlation.session_id, "{message}"),
            tracing::Level::WARN => tracing::warn!(session_id = %correlation.session_id, "{message}"),
            tracing::Level::DEBUG => tracing::debug!(session_id = %correlation.session_id, "{message}"),
            tracing::Level::TRACE => tracing::trace!(session_id = %correlation.session_id, "{message}"),
            _ => tracing::info!(session_id = %correlation.session_id, "{message}"),
        }
    }
}

/// Install a `tracing-subscriber` pipeline matching `config.log_format`/
/// `config.log_level`. Safe to call once at process start; a second call
/// is silently ignored (`try_init` returns an error the caller doesn't need).
pub fn install_default_subscriber(config: &crate::config::RuntimeConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = || EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.log_format == "json" {
        let _ = tracing_subscriber::fmt().json().with_env_filter(filter()).try_init();
    } else {
        let _ = tracing_subscriber::fmt().with_env_filter(filter()).try_init();
    }
}

pub fn default_sink() -> Arc<dyn TelemetrySink> {
    Arc::new(TracingSink)
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
