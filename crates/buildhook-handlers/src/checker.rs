//! Predicates deciding whether a job applies to an event.
//!
//! Checkers only read. A checker that does not pass stops the handler with a
//! successful no-op result.

use async_trait::async_trait;
use buildhook_core::Result;
use buildhook_core::event::EventKind;
use buildhook_core::job::TriggerType;
use tracing::debug;

use crate::context::{CallbackRecord, HandlerContext, JobRun};

#[async_trait]
pub trait Checker: Send + Sync {
    fn name(&self) -> &'static str;

    async fn pre_check(&self, ctx: &HandlerContext, run: &JobRun) -> Result<bool>;
}

/// Run checkers in order, returning the name of the first that fails.
pub async fn first_failing(
    checkers: &[Box<dyn Checker>],
    ctx: &HandlerContext,
    run: &JobRun,
) -> Result<Option<&'static str>> {
    for checker in checkers {
        if !checker.pre_check(ctx, run).await? {
            debug!(checker = checker.name(), job = %run.job.job_type, "Checker did not pass");
            return Ok(Some(checker.name()));
        }
    }
    Ok(None)
}

/// The job reacts to the kind of event that arrived.
pub struct IsJobConfigTriggerMatching;

#[async_trait]
impl Checker for IsJobConfigTriggerMatching {
    fn name(&self) -> &'static str {
        "IsJobConfigTriggerMatching"
    }

    async fn pre_check(&self, ctx: &HandlerContext, run: &JobRun) -> Result<bool> {
        let Some(trigger) = ctx.effective_trigger(&run.event).await? else {
            return Ok(false);
        };
        if trigger != run.job.trigger {
            return Ok(false);
        }

        match &run.event.kind {
            EventKind::Push { branch } if trigger == TriggerType::Commit => {
                let configured = match &run.job.branch {
                    Some(configured) => configured.clone(),
                    None => ctx.forge.default_branch().await?,
                };
                Ok(configured == *branch)
            }
            EventKind::PullRequest { target_branch, .. } => Ok(run
                .job
                .branch
                .as_ref()
                .is_none_or(|configured| configured == target_branch)),
            _ => Ok(true),
        }
    }
}

/// The event names a real repository, commit and, where needed, pull request.
pub struct IsGitForgeProjectAndEventOk;

#[async_trait]
impl Checker for IsGitForgeProjectAndEventOk {
    fn name(&self) -> &'static str {
        "IsGitForgeProjectAndEventOk"
    }

    async fn pre_check(&self, ctx: &HandlerContext, run: &JobRun) -> Result<bool> {
        let forge = &run.event.forge;
        if forge.namespace.is_empty() || forge.repo.is_empty() || forge.commit_sha.is_empty() {
            debug!("Event does not identify a project and commit");
            return Ok(false);
        }

        let needs_pr = matches!(run.event.kind, EventKind::Comment { .. })
            || (matches!(run.event.kind, EventKind::CheckRerun { .. })
                && run.job.trigger == TriggerType::PullRequest);
        if !needs_pr {
            return Ok(true);
        }

        match forge.pr_id {
            Some(pr_id) => match ctx.forge.get_pr(pr_id).await {
                Ok(_) => Ok(true),
                Err(buildhook_core::Error::NotFound(_)) => {
                    debug!(pr_id, "Pull request does not exist");
                    Ok(false)
                }
                Err(err) => Err(err),
            },
            None => Ok(false),
        }
    }
}

/// The user who caused the event may run jobs in the project.
pub struct CanActorRunJob;

#[async_trait]
impl Checker for CanActorRunJob {
    fn name(&self) -> &'static str {
        "CanActorRunJob"
    }

    async fn pre_check(&self, ctx: &HandlerContext, run: &JobRun) -> Result<bool> {
        let Some(actor) = &run.event.forge.actor else {
            return Ok(true);
        };
        let allowed = ctx.forge.who_can_act().await?;
        if allowed.iter().any(|login| login == actor) {
            Ok(true)
        } else {
            debug!(actor = %actor, "Actor is not allowed to run jobs");
            Ok(false)
        }
    }
}

/// The callback comes from the owner and project this job builds in.
pub struct AreOwnerAndProjectMatchingJob;

#[async_trait]
impl Checker for AreOwnerAndProjectMatchingJob {
    fn name(&self) -> &'static str {
        "AreOwnerAndProjectMatchingJob"
    }

    async fn pre_check(&self, ctx: &HandlerContext, run: &JobRun) -> Result<bool> {
        let Some(cb) = run.callback() else {
            return Ok(true);
        };
        let Some(record) = ctx.callback_record(cb).await? else {
            // Reported by the handler.
            return Ok(true);
        };

        let owner = ctx.service.job_owner(&run.job);
        let project = ctx.service.job_project(&run.job, record.project_event());
        if cb.owner == owner && cb.project == project {
            return Ok(true);
        }

        debug!(
            callback_owner = %cb.owner,
            callback_project = %cb.project,
            job_owner = %owner,
            job_project = %project,
            "Callback is for a different build project"
        );
        Ok(false)
    }
}

/// The callback is about the package this job view builds.
pub struct IsPackageMatchingJobView;

#[async_trait]
impl Checker for IsPackageMatchingJobView {
    fn name(&self) -> &'static str {
        "IsPackageMatchingJobView"
    }

    async fn pre_check(&self, _ctx: &HandlerContext, run: &JobRun) -> Result<bool> {
        let (Some(cb), Some(configured)) = (run.callback(), run.job.package.as_ref()) else {
            return Ok(true);
        };
        Ok(cb.package.as_ref().is_none_or(|package| package == configured))
    }
}

/// The start callback has not been processed before.
pub struct BuildNotAlreadyStarted;

#[async_trait]
impl Checker for BuildNotAlreadyStarted {
    fn name(&self) -> &'static str {
        "BuildNotAlreadyStarted"
    }

    async fn pre_check(&self, ctx: &HandlerContext, run: &JobRun) -> Result<bool> {
        let Some(cb) = run.callback() else {
            return Ok(true);
        };
        Ok(!ctx
            .callback_record(cb)
            .await?
            .as_ref()
            .is_some_and(CallbackRecord::has_started))
    }
}
