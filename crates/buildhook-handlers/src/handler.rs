//! Job handlers: build submission and the build lifecycle callbacks.

use async_trait::async_trait;
use buildhook_core::build::{BuildField, BuildFilter, BuildStatus, NewBuildTarget, NewSrpmBuild};
use buildhook_core::event::EventKind;
use buildhook_core::report::CommitState;
use buildhook_core::service::BuildRequest;
use buildhook_core::task::TaskName;
use tracing::{error, info};

use crate::checker::{
    AreOwnerAndProjectMatchingJob, BuildNotAlreadyStarted, CanActorRunJob, Checker,
    IsGitForgeProjectAndEventOk, IsJobConfigTriggerMatching, IsPackageMatchingJobView,
    first_failing,
};
use crate::context::{HandlerContext, JobRun};
use crate::reporter::{BuildStatusReporter, build_check_name};
use crate::result::{HandlerError, HandlerResult, TaskResults};
use crate::tracker::BuildTracker;

/// Prefix of the check runs owned by build jobs.
pub const BUILD_CHECK_PREFIX: &str = "rpm-build:";

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Task the handler runs as when queued.
    fn task_name(&self) -> TaskName;

    /// Predicates that must all pass before [`JobHandler::run`].
    fn checkers(&self) -> Vec<Box<dyn Checker>>;

    async fn run(&self, ctx: &HandlerContext, run: &JobRun) -> HandlerResult<TaskResults>;
}

/// Run the checker chain and, if it passes, the handler.
///
/// Errors are folded into a failed [`TaskResults`].
pub async fn run_job(handler: &dyn JobHandler, ctx: &HandlerContext, run: &JobRun) -> TaskResults {
    let outcome = match first_failing(&handler.checkers(), ctx, run).await {
        Ok(Some(checker)) => Ok(TaskResults::ok(format!(
            "Job {} is not applicable: {} did not pass.",
            run.job.job_type, checker
        ))),
        Ok(None) => handler.run(ctx, run).await,
        Err(err) => Err(HandlerError::from(err)),
    };

    outcome.unwrap_or_else(|err| {
        error!(task = %handler.task_name(), error = %err, "Handler failed");
        err.into()
    })
}

/// Submits builds for pull requests, pushes, releases, comments and reruns.
pub struct BuildHandler;

impl BuildHandler {
    /// Targets this event asks to build.
    ///
    /// A check rerun rebuilds its own target, `rebuild-failed` only the
    /// targets that failed for the same commit.
    async fn requested_targets(
        &self,
        ctx: &HandlerContext,
        run: &JobRun,
    ) -> HandlerResult<Vec<String>> {
        let configured = run.job.build_targets();

        match &run.event.kind {
            EventKind::CheckRerun { check_name, .. } => Ok(check_name
                .strip_prefix(BUILD_CHECK_PREFIX)
                .map(|target| {
                    configured
                        .iter()
                        .filter(|t| *t == target)
                        .cloned()
                        .collect()
                })
                .unwrap_or(configured)),
            EventKind::Comment { command } if command == "rebuild-failed" => {
                let project_event = run.event.project_event_ref();
                let failed = ctx
                    .store
                    .get_all_by(&BuildFilter {
                        commit_sha: Some(project_event.commit_sha.clone()),
                        owner: Some(ctx.service.job_owner(&run.job)),
                        project_name: Some(ctx.service.job_project(&run.job, &project_event)),
                        status: Some(BuildStatus::Failure),
                        target: None,
                    })
                    .await?;
                Ok(configured
                    .into_iter()
                    .filter(|t| failed.iter().any(|build| build.target == *t))
                    .collect())
            }
            _ => Ok(configured),
        }
    }
}

#[async_trait]
impl JobHandler for BuildHandler {
    fn task_name(&self) -> TaskName {
        TaskName::CoprBuild
    }

    fn checkers(&self) -> Vec<Box<dyn Checker>> {
        vec![
            Box::new(IsJobConfigTriggerMatching),
            Box::new(IsGitForgeProjectAndEventOk),
            Box::new(CanActorRunJob),
        ]
    }

    async fn run(&self, ctx: &HandlerContext, run: &JobRun) -> HandlerResult<TaskResults> {
        let targets = self.requested_targets(ctx, run).await?;
        if targets.is_empty() {
            return Ok(TaskResults::ok("No targets to build."));
        }

        let project_event = run.event.project_event_ref();
        let owner = ctx.service.job_owner(&run.job);
        let project = ctx.service.job_project(&run.job, &project_event);
        let checks: Vec<String> = targets.iter().map(|t| build_check_name(t)).collect();
        let reporter = BuildStatusReporter::new(
            ctx,
            run,
            project_event.commit_sha.clone(),
            project_event.pr_id,
        );

        let srpm = ctx
            .store
            .create_srpm_build(NewSrpmBuild {
                build_id: None,
                status: BuildStatus::Pending,
                web_url: None,
                project_event: project_event.clone(),
            })
            .await?;
        let srpm_url = ctx.service.srpm_dashboard_url(srpm.id);
        reporter
            .report(
                CommitState::Pending,
                "Job is in progress...",
                &srpm_url,
                &checks,
                None,
            )
            .await?;

        let request = BuildRequest {
            owner: owner.clone(),
            project: project.clone(),
            clone_url: ctx.forge.clone_url(),
            committish: project_event.commit_sha.clone(),
            targets: targets.clone(),
        };
        let submitted = match ctx.build_service.submit_build(&request).await {
            Ok(submitted) => submitted,
            Err(err) => {
                let msg = format!("Submit of the build failed: {}", err);
                error!(owner = %owner, project = %project, error = %err, "Build submission failed");

                ctx.store
                    .update_srpm_build(srpm.id, BuildField::Status(BuildStatus::Failure))
                    .await?;
                reporter
                    .report(CommitState::Failure, &msg, &srpm_url, &checks, None)
                    .await?;
                ctx.telemetry
                    .builds_not_submitted(targets.len(), "submit_failure");
                return Ok(TaskResults::failed(msg));
            }
        };

        let build_id = submitted.build_id.to_string();
        ctx.store
            .update_srpm_build(srpm.id, BuildField::BuildId(build_id.clone()))
            .await?;
        ctx.store
            .update_srpm_build(srpm.id, BuildField::WebUrl(submitted.web_url.clone()))
            .await?;

        for target in &targets {
            ctx.store
                .create_build_target(NewBuildTarget {
                    build_id: build_id.clone(),
                    srpm_build_id: srpm.id,
                    target: target.clone(),
                    owner: owner.clone(),
                    project_name: project.clone(),
                    status: BuildStatus::WaitingForSrpm,
                    web_url: Some(submitted.web_url.clone()),
                    task_accepted_time: run.event.accepted_at,
                    project_event: project_event.clone(),
                })
                .await?;
        }

        info!(
            build_id = %build_id,
            owner = %owner,
            project = %project,
            targets = ?targets,
            "Build submitted"
        );
        Ok(TaskResults::ok(format!("Build {} submitted.", build_id)))
    }
}

/// Handles build-service notifications that a build started.
pub struct BuildStartHandler;

#[async_trait]
impl JobHandler for BuildStartHandler {
    fn task_name(&self) -> TaskName {
        TaskName::CoprBuildStart
    }

    fn checkers(&self) -> Vec<Box<dyn Checker>> {
        vec![
            Box::new(IsJobConfigTriggerMatching),
            Box::new(AreOwnerAndProjectMatchingJob),
            Box::new(IsPackageMatchingJobView),
            Box::new(BuildNotAlreadyStarted),
        ]
    }

    async fn run(&self, ctx: &HandlerContext, run: &JobRun) -> HandlerResult<TaskResults> {
        BuildTracker::new(ctx, run)?.handle_start().await
    }
}

/// Handles build-service notifications that a build ended.
pub struct BuildEndHandler;

#[async_trait]
impl JobHandler for BuildEndHandler {
    fn task_name(&self) -> TaskName {
        TaskName::CoprBuildEnd
    }

    fn checkers(&self) -> Vec<Box<dyn Checker>> {
        vec![
            Box::new(IsJobConfigTriggerMatching),
            Box::new(AreOwnerAndProjectMatchingJob),
            Box::new(IsPackageMatchingJobView),
        ]
    }

    async fn run(&self, ctx: &HandlerContext, run: &JobRun) -> HandlerResult<TaskResults> {
        BuildTracker::new(ctx, run)?.handle_end().await
    }
}
