use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Later calls are no-ops, so several
/// applications may be built in one process (as the integration tests do).
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if METRICS_HANDLE.set(handle).is_err() {
                tracing::debug!("metrics recorder raced with another initialization");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to install Prometheus recorder"),
    }
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Count a finished webhook by how it was resolved.
pub fn record_webhook_outcome(outcome: &'static str) {
    metrics::counter!("paylink_webhook_outcomes_total", "outcome" => outcome).increment(1);
}
