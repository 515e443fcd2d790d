//! CLI command implementations.

pub mod process;
pub mod worker;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use buildhook_clients::copr::CoprClient;
use buildhook_clients::download::HttpDownloader;
use buildhook_clients::github::GitHubProject;
use buildhook_clients::metrics::MetricsTelemetry;
use buildhook_config::{ServiceConfig, load_package_config};
use buildhook_core::store::BuildStore;
use buildhook_core::task::TaskSink;
use buildhook_handlers::HandlerContext;

pub fn validate(path: &Path) -> Result<()> {
    let config = load_package_config(path)
        .with_context(|| format!("Failed to load package config: {}", path.display()))?;

    println!("Configuration is valid");
    for job in config.get_job_views() {
        println!(
            "  {} on {} ({} target(s))",
            job.job_type,
            job.trigger,
            job.targets.len()
        );
    }
    Ok(())
}

/// Collaborators talking to GitHub and Copr for one repository.
pub(crate) fn live_context(
    service: Arc<ServiceConfig>,
    namespace: &str,
    repo: &str,
    store: Arc<dyn BuildStore>,
    tasks: Arc<dyn TaskSink>,
) -> HandlerContext {
    let project = Arc::new(GitHubProject::new(
        namespace,
        repo,
        service.github_token.clone(),
    ));
    HandlerContext {
        forge: project.clone(),
        status: project,
        build_service: Arc::new(CoprClient::from_config(&service)),
        downloader: Arc::new(HttpDownloader::default()),
        store,
        tasks,
        telemetry: Arc::new(MetricsTelemetry),
        service,
    }
}
