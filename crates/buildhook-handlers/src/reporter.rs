//! Translation of build progress into forge-visible statuses and comments.

use buildhook_core::Result;
use buildhook_core::forge::ForgeProject;
use buildhook_core::job::JobConfig;
use buildhook_core::report::{CommitState, DuplicateCheckMode, StatusReport, StatusSink};
use tracing::{debug, info};

use crate::context::{HandlerContext, JobRun};

pub fn build_check_name(target: &str) -> String {
    format!("rpm-build:{}", target)
}

pub fn test_check_name(target: &str) -> String {
    format!("testing-farm:{}", target)
}

/// Reports the status of one build job, and of the test jobs that consume
/// it, on one commit.
pub struct BuildStatusReporter<'a> {
    sink: &'a dyn StatusSink,
    forge: &'a dyn ForgeProject,
    commit_sha: String,
    pr_id: Option<u64>,
    build_job: &'a JobConfig,
    tests_jobs: Vec<JobConfig>,
}

impl<'a> BuildStatusReporter<'a> {
    pub fn new(
        ctx: &'a HandlerContext,
        run: &'a JobRun,
        commit_sha: impl Into<String>,
        pr_id: Option<u64>,
    ) -> Self {
        let tests_jobs = run
            .package_config
            .tests_jobs(run.job.trigger)
            .into_iter()
            .filter(|job| !job.skip_build)
            .collect();

        Self {
            sink: ctx.status.as_ref(),
            forge: ctx.forge.as_ref(),
            commit_sha: commit_sha.into(),
            pr_id,
            build_job: &run.job,
            tests_jobs,
        }
    }

    /// Test jobs whose statuses follow the build.
    pub fn tests_jobs(&self) -> &[JobConfig] {
        &self.tests_jobs
    }

    fn build_checks(&self) -> Vec<String> {
        self.build_job
            .build_targets()
            .iter()
            .map(|t| build_check_name(t))
            .collect()
    }

    fn test_checks(&self) -> Vec<String> {
        self.tests_jobs
            .iter()
            .flat_map(|job| job.targets.iter().map(|t| test_check_name(&t.name)))
            .collect()
    }

    fn test_checks_for_chroot(&self, chroot: &str) -> Vec<String> {
        self.tests_jobs
            .iter()
            .flat_map(|job| job.test_targets_for(chroot))
            .map(|t| test_check_name(&t))
            .collect()
    }

    /// Send one report per check name.
    pub async fn report(
        &self,
        state: CommitState,
        description: &str,
        url: &str,
        check_names: &[String],
        markdown: Option<&str>,
    ) -> Result<()> {
        for check_name in check_names {
            debug!(check = %check_name, state = %state, "Reporting status");
            self.sink
                .report(&StatusReport {
                    commit_sha: self.commit_sha.clone(),
                    check_name: check_name.clone(),
                    state,
                    description: description.to_string(),
                    url: url.to_string(),
                    markdown: markdown.map(str::to_string),
                })
                .await?;
        }
        Ok(())
    }

    pub async fn report_status_to_build(
        &self,
        state: CommitState,
        description: &str,
        url: &str,
    ) -> Result<()> {
        self.report(state, description, url, &self.build_checks(), None)
            .await
    }

    /// Build checks plus every linked test check.
    pub async fn report_status_to_all(
        &self,
        state: CommitState,
        description: &str,
        url: &str,
    ) -> Result<()> {
        let mut checks = self.build_checks();
        checks.extend(self.test_checks());
        self.report(state, description, url, &checks, None).await
    }

    pub async fn report_status_to_build_for_chroot(
        &self,
        state: CommitState,
        description: &str,
        url: &str,
        chroot: &str,
    ) -> Result<()> {
        if !self.build_job.build_targets().iter().any(|t| t == chroot) {
            debug!(chroot, "Target not configured for the build job, not reporting");
            return Ok(());
        }
        self.report(state, description, url, &[build_check_name(chroot)], None)
            .await
    }

    pub async fn report_status_to_all_test_jobs_for_chroot(
        &self,
        state: CommitState,
        description: &str,
        url: &str,
        chroot: &str,
    ) -> Result<()> {
        self.report(
            state,
            description,
            url,
            &self.test_checks_for_chroot(chroot),
            None,
        )
        .await
    }

    /// Build check of `chroot` plus the test checks that consume it.
    pub async fn report_status_to_all_for_chroot(
        &self,
        state: CommitState,
        description: &str,
        url: &str,
        chroot: &str,
    ) -> Result<()> {
        self.report_status_to_build_for_chroot(state, description, url, chroot)
            .await?;
        self.report_status_to_all_test_jobs_for_chroot(state, description, url, chroot)
            .await
    }

    /// Comment on the pull request the build belongs to.
    ///
    /// Does nothing for builds outside a pull request or on forges that do not
    /// take comments.
    pub async fn comment(&self, body: &str, duplicate_check: DuplicateCheckMode) -> Result<()> {
        let Some(pr_id) = self.pr_id else {
            debug!("Not a pull request, not commenting");
            return Ok(());
        };
        if !self.forge.kind().supports_comments() {
            debug!(forge = %self.forge.kind(), "Forge does not take comments");
            return Ok(());
        }

        if duplicate_check == DuplicateCheckMode::CheckLastComment
            && self.forge.last_comment(pr_id).await?.as_deref() == Some(body)
        {
            debug!(pr_id, "Identical comment already posted, skipping");
            return Ok(());
        }

        info!(pr_id, "Commenting on pull request");
        self.forge.post_comment(pr_id, body).await
    }
}
