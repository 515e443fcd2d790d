//! Counters, durations and error reporting.

/// Sink for operational metrics and swallowed errors.
pub trait Telemetry: Send + Sync {
    fn builds_started(&self);

    fn builds_finished(&self);

    /// Builds that will never be submitted, e.g. because the SRPM failed.
    fn builds_not_submitted(&self, count: usize, reason: &str);

    /// Seconds from task acceptance to the end of the build.
    fn observe_build_finished_time(&self, seconds: f64);

    /// Seconds from the build ending to the result being reported.
    fn observe_build_end_reported_after(&self, seconds: f64);

    /// An error that was deliberately not propagated.
    fn report_error(&self, source: &str, error: &(dyn std::error::Error + 'static));
}
