//! Suppression of failures in optional side work.

use std::future::Future;

use buildhook_core::telemetry::Telemetry;
use tracing::{debug, error};

/// Await `work`, forwarding any error to telemetry instead of the caller.
///
/// Returns `None` when the work failed.
pub async fn run_best_effort<T, E, F>(telemetry: &dyn Telemetry, label: &str, work: F) -> Option<T>
where
    F: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    match work.await {
        Ok(value) => Some(value),
        Err(err) => {
            telemetry.report_error(label, &err);
            error!(source = label, error = %err, "Best-effort work failed");
            debug!(source = label, "Skipping as this is optional functionality");
            None
        }
    }
}
