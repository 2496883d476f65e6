// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn tracing_sink_is_send_sync_and_cloneable() {
    let sink: Arc<dyn TelemetrySink> = default_sink();
    let correlation = Correlation { session_id: "sess-1".into(), turn_id: Some("turn-1".into()), event_id: None };
    sink.emit_log(&correlation, tracing::Level::INFO, "hello");
    sink.emit_span(&correlation, "test-span", 12);
    sink.emit_metric(
        &correlation,
        MetricSample { name: "test.metric", value: 1.0, tags: BTreeMap::new() },
    );
}

#[test]
fn install_default_subscriber_does_not_panic_on_repeat_calls() {
    let config = crate::config::RuntimeConfig::default();
    install_default_subscriber(&config);
    install_default_subscriber(&config);
}
