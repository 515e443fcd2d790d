//! Collaborators that log instead of calling out, for `--dry-run`.

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use buildhook_core::Result;
use buildhook_core::forge::{ForgeKind, ForgeProject, PullRequest};
use buildhook_core::report::{StatusReport, StatusSink};
use buildhook_core::service::{
    ArtifactDownloader, BuildInfo, BuildRequest, BuildService, BuildTargetInfo, SubmittedBuild,
};
use buildhook_core::task::{TaskName, TaskSink};
use serde_json::Value;
use tracing::info;

/// A project where everyone may act and nothing is ever commented.
pub struct DryRunForge {
    namespace: String,
    repo: String,
    default_branch: String,
}

impl DryRunForge {
    pub fn new(namespace: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            repo: repo.into(),
            default_branch: "main".to_string(),
        }
    }
}

#[async_trait]
impl ForgeProject for DryRunForge {
    fn kind(&self) -> ForgeKind {
        ForgeKind::Github
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn repo(&self) -> &str {
        &self.repo
    }

    fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.namespace, self.repo)
    }

    async fn default_branch(&self) -> Result<String> {
        Ok(self.default_branch.clone())
    }

    async fn get_pr(&self, id: u64) -> Result<PullRequest> {
        Ok(PullRequest {
            id,
            target_branch: self.default_branch.clone(),
            target_branch_head_commit: String::new(),
            labels: Vec::new(),
        })
    }

    async fn who_can_act(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn post_comment(&self, pr_id: u64, body: &str) -> Result<()> {
        info!(pr_id, body, "[dry-run] Would comment");
        Ok(())
    }

    async fn last_comment(&self, _pr_id: u64) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Accepts every build under a made-up id.
#[derive(Default)]
pub struct DryRunBuildService {
    last_build_id: AtomicU64,
}

#[async_trait]
impl BuildService for DryRunBuildService {
    async fn get_build(&self, build_id: u64) -> Result<BuildInfo> {
        Ok(BuildInfo {
            id: build_id,
            state: "succeeded".to_string(),
            source_package_url: None,
        })
    }

    async fn get_build_target(&self, _build_id: u64, _target: &str) -> Result<BuildTargetInfo> {
        Ok(BuildTargetInfo {
            ended_on: None,
            built_packages: Vec::new(),
        })
    }

    async fn submit_build(&self, request: &BuildRequest) -> Result<SubmittedBuild> {
        let build_id = self.last_build_id.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            build_id,
            owner = %request.owner,
            project = %request.project,
            committish = %request.committish,
            targets = ?request.targets,
            "[dry-run] Would submit build"
        );
        Ok(SubmittedBuild {
            build_id,
            web_url: format!("dry-run://builds/{}", build_id),
        })
    }

    async fn submit_scan(&self, srpm: &Path, base_srpm: &Path, comment: &str) -> Result<Option<String>> {
        info!(
            srpm = %srpm.display(),
            base_srpm = %base_srpm.display(),
            comment,
            "[dry-run] Would submit scan"
        );
        Ok(None)
    }
}

/// Creates empty files in place of downloads.
pub struct DryRunDownloader;

#[async_trait]
impl ArtifactDownloader for DryRunDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        info!(url, dest = %dest.display(), "[dry-run] Would download");
        tokio::fs::write(dest, b"")
            .await
            .map_err(|e| buildhook_core::Error::Download(e.to_string()))
    }
}

pub struct LoggingStatusSink;

#[async_trait]
impl StatusSink for LoggingStatusSink {
    async fn report(&self, report: &StatusReport) -> Result<()> {
        info!(
            commit = %report.commit_sha,
            check = %report.check_name,
            state = %report.state,
            description = %report.description,
            url = %report.url,
            "[dry-run] Status"
        );
        Ok(())
    }
}

/// Keeps follow-up tasks in memory.
#[derive(Default)]
pub struct LoggingTaskSink {
    tasks: Mutex<Vec<(TaskName, Value)>>,
}

impl LoggingTaskSink {
    pub fn tasks(&self) -> Vec<(TaskName, Value)> {
        self.tasks
            .lock()
            .map(|tasks| tasks.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TaskSink for LoggingTaskSink {
    async fn enqueue(&self, task: TaskName, payload: Value) -> Result<()> {
        info!(task = %task, "[dry-run] Would enqueue task");
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push((task, payload));
        }
        Ok(())
    }
}
