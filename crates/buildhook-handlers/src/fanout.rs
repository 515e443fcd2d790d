//! Submission of test jobs that depend on a finished target build.

use buildhook_core::build::BuildTargetRecord;
use buildhook_core::job::{JobConfig, PackageConfig, TriggerType};
use buildhook_core::task::TaskName;
use buildhook_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::context::{HandlerContext, JobRun};

/// Key of the event payload listing the test targets to run.
pub const TESTS_TARGETS_OVERRIDE: &str = "tests_targets_override";

/// Payload of a testing task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestingTask {
    pub package_config: PackageConfig,
    pub job_config: JobConfig,
    pub event: Value,
    /// Id of the target build record the tests consume.
    pub build_id: i64,
}

/// Enqueue one testing task per test job that consumes `build`.
///
/// Returns how many tasks were enqueued.
pub async fn fan_out_tests(
    ctx: &HandlerContext,
    run: &JobRun,
    build: &BuildTargetRecord,
) -> Result<usize> {
    let tests_jobs = run.package_config.tests_jobs(run.job.trigger);
    if tests_jobs.is_empty() {
        debug!("No test jobs configured");
        return Ok(0);
    }

    let mut pr_labels: Option<Vec<String>> = None;
    let mut submitted = 0;

    for job in tests_jobs {
        if job.skip_build || job.manual_trigger {
            continue;
        }
        if !job.build_targets().iter().any(|t| *t == build.target) {
            continue;
        }

        if job.trigger == TriggerType::PullRequest && !job.labels.is_empty() {
            if pr_labels.is_none() {
                pr_labels = Some(fetch_pr_labels(ctx, run, build).await?);
            }
            let labels = pr_labels.as_deref().unwrap_or_default();
            if !job.labels.is_satisfied_by(labels) {
                debug!(labels = ?labels, "Pull request labels do not match test job requirements");
                continue;
            }
        }

        let targets = job.test_targets_for(&build.target);
        let mut event = serde_json::to_value(&run.event)
            .map_err(|e| Error::Internal(format!("cannot serialize event: {}", e)))?;
        if let Value::Object(map) = &mut event {
            map.insert(TESTS_TARGETS_OVERRIDE.to_string(), Value::from(targets.clone()));
        }

        let task = TestingTask {
            package_config: run.package_config.clone(),
            job_config: job,
            event,
            build_id: build.id,
        };
        let payload = serde_json::to_value(&task)
            .map_err(|e| Error::Internal(format!("cannot serialize testing task: {}", e)))?;

        info!(
            build_target = %build.target,
            test_targets = ?targets,
            "Submitting tests for finished build"
        );
        ctx.tasks.enqueue(TaskName::TestingFarm, payload).await?;
        submitted += 1;
    }

    Ok(submitted)
}

async fn fetch_pr_labels(
    ctx: &HandlerContext,
    run: &JobRun,
    build: &BuildTargetRecord,
) -> Result<Vec<String>> {
    match run.event.forge.pr_id.or(build.project_event.pr_id) {
        Some(pr_id) => Ok(ctx.forge.get_pr(pr_id).await?.labels),
        None => Ok(Vec::new()),
    }
}
