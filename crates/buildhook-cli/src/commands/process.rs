//! Dispatch a single event without going through the queue.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use buildhook_clients::dry_run::{
    DryRunBuildService, DryRunDownloader, DryRunForge, LoggingStatusSink, LoggingTaskSink,
};
use buildhook_clients::metrics::MetricsTelemetry;
use buildhook_config::{ServiceConfig, load_package_config};
use buildhook_core::event::Event;
use buildhook_db::{MemoryBuildRepo, PgBuildRepo, create_pool};
use buildhook_handlers::{Dispatcher, HandlerContext, TaskResults};
use buildhook_scheduler::TaskQueue;

use super::live_context;

pub async fn run(event_path: &Path, config_path: &Path, dry_run: bool) -> Result<()> {
    let content = std::fs::read_to_string(event_path)
        .with_context(|| format!("Failed to read event: {}", event_path.display()))?;
    let event: Event = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse event: {}", event_path.display()))?;
    let package_config = load_package_config(config_path)
        .with_context(|| format!("Failed to load package config: {}", config_path.display()))?;

    let service = Arc::new(ServiceConfig::from_env());
    let ctx = if dry_run {
        dry_run_context(service, &event)
    } else {
        let database_url = service
            .database_url
            .clone()
            .context("DATABASE_URL must be set unless --dry-run is given")?;
        let pool = create_pool(&database_url)
            .await
            .context("Failed to connect to database")?;
        live_context(
            service,
            &event.forge.namespace,
            &event.forge.repo,
            Arc::new(PgBuildRepo::new(pool.clone())),
            Arc::new(TaskQueue::new(pool)),
        )
    };

    let results = Dispatcher::new(ctx).dispatch(&event, &package_config).await;
    if results.is_empty() {
        println!("No job matches the event");
    }
    for result in &results {
        print_result(result);
    }

    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        anyhow::bail!("{} of {} job(s) failed", failed, results.len());
    }
    Ok(())
}

fn dry_run_context(service: Arc<ServiceConfig>, event: &Event) -> HandlerContext {
    HandlerContext {
        forge: Arc::new(DryRunForge::new(&event.forge.namespace, &event.forge.repo)),
        build_service: Arc::new(DryRunBuildService::default()),
        downloader: Arc::new(DryRunDownloader),
        store: Arc::new(MemoryBuildRepo::new()),
        status: Arc::new(LoggingStatusSink),
        tasks: Arc::new(LoggingTaskSink::default()),
        telemetry: Arc::new(MetricsTelemetry),
        service,
    }
}

fn print_result(result: &TaskResults) {
    let marker = if result.success { "✓" } else { "✗" };
    match result.msg() {
        Some(msg) => println!("{} {}", marker, msg),
        None => println!("{} done", marker),
    }
}
