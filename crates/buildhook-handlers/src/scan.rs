//! Differential scans of pull request builds against their base branch.
//!
//! After the canonical scan target of a pull request build succeeds, the
//! SRPM of that build and the SRPM of the newest successful base-branch build
//! are submitted to the scan service. The whole feature is optional: callers
//! run [`ScanOrchestrator::handle_scan`] through
//! [`run_best_effort`](crate::run_best_effort).

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use buildhook_config::service::DOCS_URL;
use buildhook_core::build::{
    BuildFilter, BuildStatus, BuildTargetRecord, ProjectEventKind, ProjectEventRef,
    SrpmBuildRecord,
};
use buildhook_core::forge::PullRequest;
use buildhook_core::job::{JobConfig, TriggerType};
use buildhook_core::report::CommitState;
use buildhook_core::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::context::{HandlerContext, JobRun};
use crate::reporter::BuildStatusReporter;

static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*?\}").unwrap());

pub fn scan_check_name(target: &str) -> String {
    format!("osh-diff-scan:{}", target)
}

pub fn scan_markdown() -> String {
    format!(
        "This is an experimental feature. Once the scan finishes, you can see the \
         newly introduced defects in the `added.html` in `Logs`. \
         You can disable the scanning in your configuration by \
         setting `osh_diff_scan_after_copr_build` to `false`. For more information, \
         see [docs]({}/configuration#osh_diff_scan_after_copr_build).",
        DOCS_URL
    )
}

/// Last `{...}` object embedded in the scan service output.
///
/// Matching is non-greedy, so nested objects are not supported. Returns
/// `None` when there is no match or the match is not a JSON object.
pub fn parse_dict_from_output(output: &str) -> Option<Map<String, Value>> {
    let candidate = JSON_OBJECT.find_iter(output).last()?;
    match serde_json::from_str::<Value>(candidate.as_str()) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(err) => {
            debug!(error = %err, "Scan output does not end with a JSON object");
            None
        }
    }
}

/// Whether a successful target build qualifies for a scan.
pub fn should_scan(ctx: &HandlerContext, run: &JobRun, build: &BuildTargetRecord) -> bool {
    if ctx.service.osh_disabled {
        info!("Scanning disabled via DISABLE_OPENSCANHUB");
        return false;
    }
    build.project_event.is_pull_request()
        && build.target == ctx.service.scan_target
        && run.job.osh_diff_scan_after_copr_build
}

pub struct ScanOrchestrator<'a> {
    ctx: &'a HandlerContext,
    run: &'a JobRun,
    build: &'a BuildTargetRecord,
    reporter: &'a BuildStatusReporter<'a>,
}

impl<'a> ScanOrchestrator<'a> {
    pub fn new(
        ctx: &'a HandlerContext,
        run: &'a JobRun,
        build: &'a BuildTargetRecord,
        reporter: &'a BuildStatusReporter<'a>,
    ) -> Self {
        Self {
            ctx,
            run,
            build,
            reporter,
        }
    }

    /// Submit the scan and report its URL.
    ///
    /// Returns the scan URL, or `None` when there was nothing to scan against
    /// or the scan service gave no usable answer.
    pub async fn handle_scan(&self) -> Result<Option<String>> {
        let pr_id = self
            .build
            .project_event
            .pr_id
            .or(self.run.event.forge.pr_id)
            .ok_or_else(|| Error::InvalidInput("scanned build has no pull request".to_string()))?;
        let pr = self.ctx.forge.get_pr(pr_id).await?;

        let Some(base_job) = self.find_base_build_job(&pr).await? else {
            debug!("No base build job needed for diff scan found in the config");
            return Ok(None);
        };

        info!(build_id = %self.build.build_id, "Preparing to trigger scan");

        let Some(base_srpm) = self.base_srpm(&base_job, &pr).await? else {
            return Ok(None);
        };
        let srpm = self
            .ctx
            .store
            .get_srpm_build(self.build.srpm_build_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("srpm build {}", self.build.srpm_build_id)))?;

        let directory = TempDir::new()
            .map_err(|e| Error::Download(format!("cannot create download directory: {}", e)))?;
        // An unreachable artifact host aborts the scan like a missing base build.
        let (base_path, head_path) = match self
            .download_srpms(directory.path(), &base_srpm, &srpm)
            .await
        {
            Ok(paths) => paths,
            Err(err) => {
                info!(error = %err, "Downloading of SRPMs failed, skipping the scan");
                return Ok(None);
            }
        };

        let build_dashboard_url = self.ctx.service.build_dashboard_url(self.build.id);
        let output = self
            .ctx
            .build_service
            .submit_scan(
                &head_path,
                &base_path,
                &format!("Submitted via Packit Service for {}.", build_dashboard_url),
            )
            .await?;

        let Some(output) = output.filter(|o| !o.trim().is_empty()) else {
            debug!("Scan service returned no output, skipping the reporting");
            return Ok(None);
        };
        info!("Scan submitted successfully");

        let response = parse_dict_from_output(&output);
        debug!(response = ?response, "Parsed scan response");

        let Some(url) = response
            .as_ref()
            .and_then(|map| map.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            debug!("It was not possible to get the URL from the response");
            return Ok(None);
        };

        self.reporter
            .report(
                CommitState::Success,
                "Scan in OpenScanHub submitted successfully. Check the URL for more details.",
                &url,
                &[scan_check_name(&self.ctx.service.scan_target)],
                Some(&scan_markdown()),
            )
            .await?;

        Ok(Some(url))
    }

    /// First commit-triggered build job building the pull request's target
    /// branch, either explicitly or as the default branch.
    async fn find_base_build_job(&self, pr: &PullRequest) -> Result<Option<JobConfig>> {
        let mut default_branch: Option<String> = None;

        for job in self.run.package_config.get_job_views() {
            if !job.job_type.is_build() || job.trigger != TriggerType::Commit {
                continue;
            }
            let matches = match &job.branch {
                Some(branch) => *branch == pr.target_branch,
                None => {
                    if default_branch.is_none() {
                        default_branch = Some(self.ctx.forge.default_branch().await?);
                    }
                    default_branch.as_deref() == Some(pr.target_branch.as_str())
                }
            };
            if matches {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    /// SRPM of the newest successful scan-target build of the target branch
    /// head in the base job's project.
    async fn base_srpm(&self, base_job: &JobConfig, pr: &PullRequest) -> Result<Option<SrpmBuildRecord>> {
        let branch_event = ProjectEventRef {
            kind: ProjectEventKind::BranchPush,
            namespace: self.ctx.forge.namespace().to_string(),
            repo: self.ctx.forge.repo().to_string(),
            commit_sha: pr.target_branch_head_commit.clone(),
            pr_id: None,
            branch: Some(
                base_job
                    .branch
                    .clone()
                    .unwrap_or_else(|| pr.target_branch.clone()),
            ),
            tag: None,
        };
        let owner = self.ctx.service.job_owner(base_job);
        let project = self.ctx.service.job_project(base_job, &branch_event);

        debug!(
            commit = %pr.target_branch_head_commit,
            owner = %owner,
            project = %project,
            "Searching for base build"
        );

        let builds = self
            .ctx
            .store
            .get_all_by(&BuildFilter {
                commit_sha: Some(pr.target_branch_head_commit.clone()),
                project_name: Some(project),
                owner: Some(owner),
                target: Some(self.ctx.service.scan_target.clone()),
                status: Some(BuildStatus::Success),
            })
            .await?;

        let Some(base) = builds.first() else {
            debug!("No matching base build found");
            return Ok(None);
        };
        self.ctx.store.get_srpm_build(base.srpm_build_id).await
    }

    async fn download_srpms(
        &self,
        directory: &Path,
        base: &SrpmBuildRecord,
        head: &SrpmBuildRecord,
    ) -> Result<(PathBuf, PathBuf)> {
        let base_path = self.download_srpm(&directory.join("base"), base).await?;
        let head_path = self.download_srpm(&directory.join("head"), head).await?;
        Ok((base_path, head_path))
    }

    async fn download_srpm(&self, directory: &Path, srpm: &SrpmBuildRecord) -> Result<PathBuf> {
        let url = srpm
            .url
            .as_deref()
            .ok_or_else(|| Error::NotFound(format!("URL of srpm build {}", srpm.id)))?;

        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|e| Error::Download(e.to_string()))?;
        let path = directory.join(srpm_file_name(url));

        self.ctx.downloader.download(url, &path).await?;
        Ok(path)
    }
}

fn srpm_file_name(url: &str) -> &str {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("source.src.rpm")
}
