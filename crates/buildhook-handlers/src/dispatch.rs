//! Routing of events to job handlers.

use buildhook_core::event::{Event, EventKind};
use buildhook_core::job::PackageConfig;
use buildhook_core::task::TaskName;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::context::{HandlerContext, JobRun};
use crate::handler::{
    BUILD_CHECK_PREFIX, BuildEndHandler, BuildHandler, BuildStartHandler, JobHandler, run_job,
};
use crate::result::{HandlerError, HandlerResult, TaskResults};

/// Comment commands that request a build.
const BUILD_COMMANDS: &[&str] = &["build", "copr-build", "rebuild-failed"];

struct Route {
    handler: &'static dyn JobHandler,
    accepts: fn(&Event) -> bool,
}

const ROUTES: &[Route] = &[
    Route {
        handler: &BuildHandler,
        accepts: requests_build,
    },
    Route {
        handler: &BuildStartHandler,
        accepts: |event| matches!(event.kind, EventKind::BuildStart(_)),
    },
    Route {
        handler: &BuildEndHandler,
        accepts: |event| matches!(event.kind, EventKind::BuildEnd(_)),
    },
];

fn requests_build(event: &Event) -> bool {
    match &event.kind {
        EventKind::PullRequest { .. } | EventKind::Push { .. } | EventKind::Release { .. } => true,
        EventKind::Comment { command } => BUILD_COMMANDS.contains(&command.as_str()),
        EventKind::CheckRerun { check_name, .. } => check_name.starts_with(BUILD_CHECK_PREFIX),
        EventKind::BuildStart(_) | EventKind::BuildEnd(_) => false,
    }
}

fn handler_for(task: TaskName) -> Option<&'static dyn JobHandler> {
    ROUTES
        .iter()
        .map(|route| route.handler)
        .find(|handler| handler.task_name() == task)
}

/// Payload of a [`TaskName::ProcessMessage`] task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub event: Event,
    pub package_config: PackageConfig,
}

/// Matches events against package config jobs and runs their handlers.
pub struct Dispatcher {
    ctx: HandlerContext,
}

impl Dispatcher {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    /// Build jobs the event is routed to, with their handler.
    fn plan(
        &self,
        event: &Event,
        package_config: &PackageConfig,
    ) -> Vec<(&'static dyn JobHandler, JobRun)> {
        let mut planned = Vec::new();
        for route in ROUTES.iter().filter(|route| (route.accepts)(event)) {
            for job in package_config
                .get_job_views()
                .into_iter()
                .filter(|job| job.job_type.is_build())
            {
                planned.push((
                    route.handler,
                    JobRun::new(package_config.clone(), job, event.clone()),
                ));
            }
        }
        planned
    }

    /// Run every applicable job in this process.
    pub async fn dispatch(&self, event: &Event, package_config: &PackageConfig) -> Vec<TaskResults> {
        let planned = self.plan(event, package_config);
        if planned.is_empty() {
            debug!("No job matches the event");
        }

        let mut results = Vec::with_capacity(planned.len());
        for (handler, run) in planned {
            results.push(run_job(handler, &self.ctx, &run).await);
        }
        results
    }

    /// Queue every applicable job as a task of its own.
    ///
    /// Returns how many tasks were queued.
    pub async fn process_message(
        &self,
        event: &Event,
        package_config: &PackageConfig,
    ) -> HandlerResult<usize> {
        let planned = self.plan(event, package_config);
        for (handler, run) in &planned {
            info!(task = %handler.task_name(), job = %run.job.job_type, "Queueing job");
            self.ctx
                .tasks
                .enqueue(handler.task_name(), serde_json::to_value(run)?)
                .await?;
        }
        Ok(planned.len())
    }

    /// Run a task claimed from the queue.
    pub async fn run_task(&self, task: TaskName, payload: Value) -> HandlerResult<TaskResults> {
        if task == TaskName::ProcessMessage {
            let message: Message = serde_json::from_value(payload)?;
            let queued = self
                .process_message(&message.event, &message.package_config)
                .await?;
            return Ok(TaskResults::ok(format!("{} job(s) queued.", queued)));
        }

        let handler = handler_for(task).ok_or_else(|| HandlerError::UnknownTask(task.to_string()))?;
        let run: JobRun = serde_json::from_value(payload)?;
        Ok(run_job(handler, &self.ctx, &run).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use buildhook_core::build::BuildStatus;
    use buildhook_core::event::SRPM_CHROOT;

    fn dispatcher(harness: &Harness) -> Dispatcher {
        Dispatcher::new(harness.ctx.clone())
    }

    #[test]
    fn test_build_requests() {
        assert!(requests_build(&pr_event()));
        assert!(requests_build(&push_event("main")));
        assert!(requests_build(&comment_event("copr-build")));
        assert!(requests_build(&comment_event("rebuild-failed")));
        assert!(!requests_build(&comment_event("test")));
        assert!(!requests_build(&end_event(RAWHIDE, 1)));
    }

    #[test]
    fn test_handler_lookup() {
        assert!(handler_for(TaskName::CoprBuild).is_some());
        assert!(handler_for(TaskName::CoprBuildEnd).is_some());
        assert!(handler_for(TaskName::TestingFarm).is_none());
    }

    #[tokio::test]
    async fn test_dispatch_runs_build_jobs_only() {
        let harness = Harness::new();
        let config = package_config(vec![build_job(), tests_job(&[RAWHIDE])]);

        let results = dispatcher(&harness).dispatch(&pr_event(), &config).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(harness.builds.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_unrelated_comment_runs_nothing() {
        let harness = Harness::new();
        let config = package_config(vec![build_job()]);

        let results = dispatcher(&harness)
            .dispatch(&comment_event("propose-downstream"), &config)
            .await;

        assert!(results.is_empty());
        assert!(harness.builds.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_queued_jobs_run_as_tasks() {
        let harness = Harness::new();
        let dispatcher = dispatcher(&harness);
        let message = Message {
            event: pr_event(),
            package_config: package_config(vec![build_job()]),
        };

        let result = dispatcher
            .run_task(TaskName::ProcessMessage, serde_json::to_value(&message).unwrap())
            .await
            .unwrap();
        assert_eq!(result.msg(), Some("1 job(s) queued."));

        let tasks = harness.tasks.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].0, TaskName::CoprBuild);
        assert!(harness.builds.submitted().is_empty());

        let (task, payload) = tasks[0].clone();
        let result = dispatcher.run_task(task, payload).await.unwrap();
        assert!(result.success);
        assert_eq!(harness.builds.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_callbacks_are_routed_by_kind() {
        let harness = Harness::new();
        let (srpm, _) = harness.seed_build(BUILD_ID, &[RAWHIDE], pr_project_event()).await;
        let config = package_config(vec![build_job()]);

        let results = dispatcher(&harness)
            .dispatch(&end_event(SRPM_CHROOT, 1), &config)
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].msg(), Some("SRPM build in Copr has finished."));
        assert_eq!(harness.srpm(srpm.id).await.status, BuildStatus::Success);
    }

    #[tokio::test]
    async fn test_unknown_task_and_bad_payload() {
        let harness = Harness::new();
        let dispatcher = dispatcher(&harness);

        let err = dispatcher
            .run_task(TaskName::TestingFarm, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::UnknownTask(_)));

        let err = dispatcher
            .run_task(TaskName::CoprBuildEnd, serde_json::json!({"job": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Payload(_)));
    }
}
