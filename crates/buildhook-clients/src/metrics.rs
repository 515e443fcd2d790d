//! Prometheus metrics for build tracking.

use buildhook_core::telemetry::Telemetry;
use metrics::{counter, histogram};
use tracing::warn;

/// Install the Prometheus exporter on its default listen address.
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// [`Telemetry`] recorded through the `metrics` facade.
///
/// Without an installed recorder every call is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsTelemetry;

impl Telemetry for MetricsTelemetry {
    fn builds_started(&self) {
        counter!("buildhook_builds_started_total").increment(1);
    }

    fn builds_finished(&self) {
        counter!("buildhook_builds_finished_total").increment(1);
    }

    fn builds_not_submitted(&self, count: usize, reason: &str) {
        counter!("buildhook_builds_not_submitted_total", "reason" => reason.to_string())
            .increment(count as u64);
    }

    fn observe_build_finished_time(&self, seconds: f64) {
        histogram!("buildhook_build_finished_time_seconds").record(seconds);
    }

    fn observe_build_end_reported_after(&self, seconds: f64) {
        histogram!("buildhook_build_end_reported_after_seconds").record(seconds);
    }

    fn report_error(&self, source: &str, error: &(dyn std::error::Error + 'static)) {
        counter!("buildhook_swallowed_errors_total", "source" => source.to_string()).increment(1);
        warn!(source, error = %error, "Error reported to telemetry");
    }
}
