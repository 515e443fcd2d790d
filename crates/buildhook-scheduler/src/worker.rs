//! Worker that processes tasks from the queue.

use std::sync::Arc;
use std::time::Duration;

use buildhook_core::task::TaskName;
use buildhook_handlers::{Dispatcher, TaskResults};
use chrono::{TimeDelta, Utc};
use serde_json::Value;
use tokio::time::{interval, sleep};
use tracing::{info, warn};

use crate::error::QueueError;
use crate::queue::{QueuedTask, TaskSource};

/// Tasks a worker claims unless told otherwise.
pub const DEFAULT_TASKS: &[TaskName] = &[
    TaskName::ProcessMessage,
    TaskName::CoprBuild,
    TaskName::CoprBuildStart,
    TaskName::CoprBuildEnd,
];

/// Claims older than this many seconds belong to a worker that died.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 30 * 60;

/// Picks the dispatcher a task payload runs through.
///
/// Handlers talk to a single forge project, so a worker serving many
/// repositories needs one dispatcher per project.
pub trait DispatcherSource: Send + Sync {
    fn dispatcher_for(&self, payload: &Value) -> Result<Arc<Dispatcher>, String>;
}

impl DispatcherSource for Arc<Dispatcher> {
    fn dispatcher_for(&self, _payload: &Value) -> Result<Arc<Dispatcher>, String> {
        Ok(self.clone())
    }
}

/// Namespace and repository of the event a task payload carries.
pub fn payload_project(payload: &Value) -> Option<(&str, &str)> {
    let forge = payload.get("event")?.get("forge")?;
    Some((forge.get("namespace")?.as_str()?, forge.get("repo")?.as_str()?))
}

/// A worker that claims tasks and runs them through the dispatcher.
pub struct Worker {
    id: String,
    queue: Arc<dyn TaskSource>,
    dispatchers: Arc<dyn DispatcherSource>,
    tasks: Vec<TaskName>,
    stale_after: TimeDelta,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<dyn TaskSource>,
        dispatchers: impl DispatcherSource + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            dispatchers: Arc::new(dispatchers),
            tasks: DEFAULT_TASKS.to_vec(),
            stale_after: TimeDelta::seconds(DEFAULT_STALE_AFTER_SECS),
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<TaskName>) -> Self {
        self.tasks = tasks;
        self
    }

    /// How long a task may stay claimed before it is handed out again.
    pub fn with_stale_after(mut self, stale_after: TimeDelta) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Run the worker loop.
    pub async fn run(&self) {
        info!(worker_id = %self.id, tasks = ?self.tasks, "Starting worker");

        loop {
            match self.run_once().await {
                Ok(true) => {}
                // No tasks available, wait before polling again
                Ok(false) => sleep(Duration::from_secs(1)).await,
                Err(e) => {
                    warn!(error = %e, "Failed to claim task");
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    /// Release stale claims every `period`.
    pub async fn release_stale_periodically(&self, period: Duration) {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = self.release_stale().await {
                warn!(error = %e, "Failed to release stale tasks");
            }
        }
    }

    /// Put tasks claimed longer than the stale timeout back to pending.
    pub async fn release_stale(&self) -> Result<u64, QueueError> {
        let released = self
            .queue
            .release_stale(Utc::now() - self.stale_after)
            .await?;
        if released > 0 {
            info!(released, "Released stale tasks");
        }
        Ok(released)
    }

    /// Claim and process at most one task.
    ///
    /// Returns whether a task was claimed.
    pub async fn run_once(&self) -> Result<bool, QueueError> {
        let Some(task) = self.queue.claim(&self.id, &self.tasks).await? else {
            return Ok(false);
        };
        info!(task_id = %task.id, task = %task.task_name, attempt = task.attempts, "Claimed task");

        match self.process(&task).await {
            Ok(results) => {
                if !results.success {
                    info!(task_id = %task.id, details = ?results.details, "Task finished unsuccessfully");
                }
                let value = serde_json::to_value(&results)?;
                if let Err(e) = self.queue.complete(task.id, &value).await {
                    warn!(task_id = %task.id, error = %e, "Failed to mark task complete");
                }
            }
            Err(message) => {
                warn!(task_id = %task.id, error = %message, "Task failed");
                if let Err(e) = self.queue.fail(task.id, &message).await {
                    warn!(task_id = %task.id, error = %e, "Failed to mark task failed");
                }
            }
        }
        Ok(true)
    }

    async fn process(&self, task: &QueuedTask) -> Result<TaskResults, String> {
        let name = task.name()?;
        let payload = &task.payload.0;
        self.dispatchers
            .dispatcher_for(payload)?
            .run_task(name, payload.clone())
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use buildhook_clients::dry_run::{
        DryRunBuildService, DryRunDownloader, DryRunForge, LoggingStatusSink, LoggingTaskSink,
    };
    use buildhook_clients::metrics::MetricsTelemetry;
    use buildhook_config::{ServiceConfig, parse_package_config};
    use buildhook_db::MemoryBuildRepo;
    use buildhook_handlers::HandlerContext;
    use buildhook_handlers::dispatch::Message;
    use chrono::DateTime;
    use sqlx::types::Json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeSource {
        pending: Mutex<VecDeque<QueuedTask>>,
        claimed: Mutex<Vec<QueuedTask>>,
        completed: Mutex<Vec<(Uuid, Value)>>,
        failed: Mutex<Vec<(Uuid, String)>>,
    }

    impl FakeSource {
        fn push(&self, task_name: &str, payload: Value) -> Uuid {
            let id = Uuid::now_v7();
            self.pending.lock().unwrap().push_back(QueuedTask {
                id,
                task_name: task_name.to_string(),
                payload: Json(payload),
                status: "pending".to_string(),
                attempts: 0,
                last_error: None,
                claimed_by: None,
                claimed_at: None,
                created_at: Utc::now(),
            });
            id
        }

        /// Pretend the claim of a task happened `ago`.
        fn backdate_claim(&self, task_id: Uuid, ago: TimeDelta) {
            for task in self.claimed.lock().unwrap().iter_mut() {
                if task.id == task_id {
                    task.claimed_at = Some(Utc::now() - ago);
                }
            }
        }
    }

    #[async_trait]
    impl TaskSource for FakeSource {
        async fn claim(
            &self,
            worker_id: &str,
            _tasks: &[TaskName],
        ) -> Result<Option<QueuedTask>, QueueError> {
            let Some(mut task) = self.pending.lock().unwrap().pop_front() else {
                return Ok(None);
            };
            task.status = "claimed".to_string();
            task.claimed_by = Some(worker_id.to_string());
            task.claimed_at = Some(Utc::now());
            task.attempts += 1;
            self.claimed.lock().unwrap().push(task.clone());
            Ok(Some(task))
        }

        async fn complete(&self, task_id: Uuid, result: &Value) -> Result<(), QueueError> {
            self.claimed.lock().unwrap().retain(|task| task.id != task_id);
            self.completed
                .lock()
                .unwrap()
                .push((task_id, result.clone()));
            Ok(())
        }

        async fn fail(&self, task_id: Uuid, error: &str) -> Result<(), QueueError> {
            self.claimed.lock().unwrap().retain(|task| task.id != task_id);
            self.failed
                .lock()
                .unwrap()
                .push((task_id, error.to_string()));
            Ok(())
        }

        async fn release_stale(
            &self,
            claimed_before: DateTime<Utc>,
        ) -> Result<u64, QueueError> {
            let mut claimed = self.claimed.lock().unwrap();
            let (stale, fresh): (Vec<_>, Vec<_>) = claimed
                .drain(..)
                .partition(|task| task.claimed_at.is_some_and(|at| at < claimed_before));
            *claimed = fresh;

            let mut pending = self.pending.lock().unwrap();
            let released = stale.len() as u64;
            for mut task in stale {
                task.status = "pending".to_string();
                task.claimed_by = None;
                task.claimed_at = None;
                pending.push_back(task);
            }
            Ok(released)
        }
    }

    fn dispatcher() -> Arc<Dispatcher> {
        let service = ServiceConfig::default();
        let ctx = HandlerContext {
            forge: Arc::new(DryRunForge::new("the-namespace", "the-repo")),
            build_service: Arc::new(DryRunBuildService::default()),
            downloader: Arc::new(DryRunDownloader),
            store: Arc::new(MemoryBuildRepo::new()),
            status: Arc::new(LoggingStatusSink),
            tasks: Arc::new(LoggingTaskSink::default()),
            telemetry: Arc::new(MetricsTelemetry),
            service: Arc::new(service),
        };
        Arc::new(Dispatcher::new(ctx))
    }

    fn message() -> Value {
        let package_config = parse_package_config(
            r#"
            package "python-foo"
            job "copr_build" trigger="pull_request" {
                targets "fedora-rawhide-x86_64"
            }
            "#,
        )
        .unwrap();
        let event = serde_json::json!({
            "kind": {"type": "pull_request", "action": "opened", "target_branch": "main"},
            "forge": {
                "forge": "github",
                "namespace": "the-namespace",
                "repo": "the-repo",
                "commit_sha": "f00dcafe",
                "pr_id": 342,
                "actor": null
            },
            "accepted_at": null
        });
        serde_json::to_value(Message {
            event: serde_json::from_value(event).unwrap(),
            package_config,
        })
        .unwrap()
    }

    #[test]
    fn test_payload_project() {
        assert_eq!(
            payload_project(&message()),
            Some(("the-namespace", "the-repo"))
        );
        assert_eq!(payload_project(&Value::Null), None);
    }

    #[tokio::test]
    async fn test_idle_queue() {
        let source = Arc::new(FakeSource::default());
        let worker = Worker::new("worker-1", source, dispatcher());
        assert!(!worker.run_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_task_results_are_stored() {
        let source = Arc::new(FakeSource::default());
        let id = source.push("task.steve_jobs.process_message", message());
        let worker = Worker::new("worker-1", source.clone(), dispatcher());

        assert!(worker.run_once().await.unwrap());

        let completed = source.completed.lock().unwrap().clone();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].0, id);
        assert_eq!(completed[0].1["success"], true);
        assert_eq!(completed[0].1["details"]["msg"], "1 job(s) queued.");
        assert!(source.failed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stale_claims_go_back_to_the_queue() {
        let source = Arc::new(FakeSource::default());
        let crashed = source.push("task.steve_jobs.process_message", message());
        let busy = source.push("task.steve_jobs.process_message", message());
        let worker = Worker::new("worker-1", source.clone(), dispatcher())
            .with_stale_after(TimeDelta::minutes(30));

        // Two claims that never finished, one of them long ago.
        source.claim("worker-0", DEFAULT_TASKS).await.unwrap();
        source.claim("worker-0", DEFAULT_TASKS).await.unwrap();
        source.backdate_claim(crashed, TimeDelta::hours(2));
        source.backdate_claim(busy, TimeDelta::minutes(5));

        assert_eq!(worker.release_stale().await.unwrap(), 1);
        assert_eq!(worker.release_stale().await.unwrap(), 0);

        assert!(worker.run_once().await.unwrap());
        let completed = source.completed.lock().unwrap().clone();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].0, crashed);
        assert!(!worker.run_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_and_unhandled_tasks_fail() {
        let source = Arc::new(FakeSource::default());
        let bogus = source.push("task.bogus", Value::Null);
        let testing = source.push("task.run_testing_farm_handler", Value::Null);
        let worker = Worker::new("worker-1", source.clone(), dispatcher());

        assert!(worker.run_once().await.unwrap());
        assert!(worker.run_once().await.unwrap());

        let failed = source.failed.lock().unwrap().clone();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0], (bogus, "unknown task: task.bogus".to_string()));
        assert_eq!(testing, failed[1].0);
        assert!(failed[1].1.contains("no handler for task"));
    }
}
