//! Queue worker command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use buildhook_clients::metrics::init_metrics;
use buildhook_config::ServiceConfig;
use buildhook_core::store::BuildStore;
use buildhook_db::{PgBuildRepo, create_pool, run_migrations};
use buildhook_handlers::Dispatcher;
use buildhook_scheduler::{DispatcherSource, TaskQueue, Worker, payload_project};
use chrono::TimeDelta;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::live_context;

/// Builds a dispatcher for the repository each task is about.
struct GitHubDispatchers {
    service: Arc<ServiceConfig>,
    store: Arc<dyn BuildStore>,
    queue: Arc<TaskQueue>,
}

impl DispatcherSource for GitHubDispatchers {
    fn dispatcher_for(&self, payload: &Value) -> Result<Arc<Dispatcher>, String> {
        let (namespace, repo) = payload_project(payload)
            .ok_or_else(|| "task payload names no project".to_string())?;
        let ctx = live_context(
            self.service.clone(),
            namespace,
            repo,
            self.store.clone(),
            self.queue.clone(),
        );
        Ok(Arc::new(Dispatcher::new(ctx)))
    }
}

/// How often claims are checked for staleness.
const RELEASE_STALE_PERIOD: Duration = Duration::from_secs(60);

pub async fn run(id: Option<String>, stale_after_secs: i64) -> Result<()> {
    let service = Arc::new(ServiceConfig::from_env());
    let database_url = service
        .database_url
        .clone()
        .context("DATABASE_URL must be set to run a worker")?;

    info!("Connecting to database...");
    let pool = create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("Database connected");

    init_metrics();

    let queue = Arc::new(TaskQueue::new(pool.clone()));
    let dispatchers = GitHubDispatchers {
        service,
        store: Arc::new(PgBuildRepo::new(pool)),
        queue: queue.clone(),
    };
    let id = id.unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));
    let worker = Worker::new(id, queue, dispatchers)
        .with_stale_after(TimeDelta::seconds(stale_after_secs));

    tokio::select! {
        _ = worker.run() => {}
        _ = worker.release_stale_periodically(RELEASE_STALE_PERIOD) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutting down worker");
        }
    }

    Ok(())
}
