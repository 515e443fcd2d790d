//! Clients for the services buildhook talks to.
//!
//! - [`github::GitHubProject`]: forge project and commit statuses
//! - [`copr::CoprClient`]: build submission, build state and diff scans
//! - [`download::HttpDownloader`]: SRPM downloads
//! - [`metrics::MetricsTelemetry`]: Prometheus metrics
//! - [`dry_run`]: collaborators that only log, for local runs

pub mod copr;
pub mod download;
pub mod dry_run;
pub mod error;
pub mod github;
pub mod metrics;

pub use error::ClientError;
