//! Build records and the build status state machine.
//!
//! A triggering event produces one [`SrpmBuildRecord`] (the source-package
//! build) and one [`BuildTargetRecord`] per target. Target records stay in
//! [`BuildStatus::WaitingForSrpm`] until the SRPM build succeeds.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Status of an SRPM build or of a single build target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Target build cannot start before the SRPM is built.
    #[display("waiting_for_srpm")]
    WaitingForSrpm,
    /// Accepted by the build service, not started yet.
    #[display("pending")]
    Pending,
    /// Build is running.
    #[display("running")]
    Running,
    /// Build finished successfully.
    #[display("success")]
    Success,
    /// Build failed.
    #[display("failure")]
    Failure,
}

impl BuildStatus {
    pub fn is_final(self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Failure)
    }

    /// Whether a record in this state may move to `next`.
    ///
    /// Re-entering the current non-final state is allowed and is a no-op for
    /// callers. Nothing leaves a final state.
    pub fn can_transition_to(self, next: BuildStatus) -> bool {
        use BuildStatus::*;

        match (self, next) {
            (WaitingForSrpm, Pending)
            | (Pending, Running)
            | (Pending, Success)
            | (Pending, Failure)
            | (Running, Success)
            | (Running, Failure) => true,
            (current, next) => current == next && !current.is_final(),
        }
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting_for_srpm" => Ok(BuildStatus::WaitingForSrpm),
            "pending" => Ok(BuildStatus::Pending),
            "running" => Ok(BuildStatus::Running),
            "success" => Ok(BuildStatus::Success),
            "failure" => Ok(BuildStatus::Failure),
            _ => Err(format!("Unknown build status: {}", s)),
        }
    }
}

/// Kind of upstream event a build was triggered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectEventKind {
    PullRequest,
    BranchPush,
    Release,
}

/// Reference from a build to the event that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEventRef {
    pub kind: ProjectEventKind,
    pub namespace: String,
    pub repo: String,
    pub commit_sha: String,
    pub pr_id: Option<u64>,
    pub branch: Option<String>,
    pub tag: Option<String>,
}

impl ProjectEventRef {
    pub fn is_pull_request(&self) -> bool {
        self.kind == ProjectEventKind::PullRequest
    }
}

/// A package produced by a target build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltPackage {
    pub name: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
}

/// Source package build for one triggering event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SrpmBuildRecord {
    pub id: i64,
    /// Build id assigned by the build service.
    pub build_id: Option<String>,
    pub status: BuildStatus,
    /// Where the built SRPM can be downloaded from.
    pub url: Option<String>,
    pub logs_url: Option<String>,
    pub web_url: Option<String>,
    pub build_start_time: Option<DateTime<Utc>>,
    pub build_finished_time: Option<DateTime<Utc>>,
    pub project_event: ProjectEventRef,
}

/// Binary build of one target (chroot) under a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildTargetRecord {
    pub id: i64,
    pub build_id: String,
    pub srpm_build_id: i64,
    pub target: String,
    pub owner: String,
    pub project_name: String,
    pub status: BuildStatus,
    pub web_url: Option<String>,
    pub build_logs_url: Option<String>,
    pub build_start_time: Option<DateTime<Utc>>,
    pub build_finished_time: Option<DateTime<Utc>>,
    pub built_packages: Option<Vec<BuiltPackage>>,
    /// When the service accepted the triggering task. Unset for builds that
    /// exist only to serve test jobs.
    pub task_accepted_time: Option<DateTime<Utc>>,
    pub project_event: ProjectEventRef,
}

/// A single-field update of a build record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BuildField {
    Status(BuildStatus),
    BuildId(String),
    StartTime(DateTime<Utc>),
    EndTime(DateTime<Utc>),
    LogsUrl(String),
    Url(String),
    WebUrl(String),
    BuiltPackages(Vec<BuiltPackage>),
}

impl SrpmBuildRecord {
    /// Apply a field update. Fields without an SRPM counterpart are ignored.
    pub fn apply(&mut self, field: &BuildField) {
        match field {
            BuildField::Status(status) => self.status = *status,
            BuildField::BuildId(id) => self.build_id = Some(id.clone()),
            BuildField::StartTime(at) => self.build_start_time = Some(*at),
            BuildField::EndTime(at) => self.build_finished_time = Some(*at),
            BuildField::LogsUrl(url) => self.logs_url = Some(url.clone()),
            BuildField::Url(url) => self.url = Some(url.clone()),
            BuildField::WebUrl(url) => self.web_url = Some(url.clone()),
            BuildField::BuiltPackages(_) => {}
        }
    }
}

impl BuildTargetRecord {
    /// Apply a field update. Fields without a target counterpart are ignored.
    pub fn apply(&mut self, field: &BuildField) {
        match field {
            BuildField::Status(status) => self.status = *status,
            BuildField::BuildId(id) => self.build_id = id.clone(),
            BuildField::StartTime(at) => self.build_start_time = Some(*at),
            BuildField::EndTime(at) => self.build_finished_time = Some(*at),
            BuildField::LogsUrl(url) => self.build_logs_url = Some(url.clone()),
            BuildField::WebUrl(url) => self.web_url = Some(url.clone()),
            BuildField::BuiltPackages(packages) => self.built_packages = Some(packages.clone()),
            BuildField::Url(_) => {}
        }
    }
}

/// Data needed to create an SRPM build record.
#[derive(Debug, Clone)]
pub struct NewSrpmBuild {
    pub build_id: Option<String>,
    pub status: BuildStatus,
    pub web_url: Option<String>,
    pub project_event: ProjectEventRef,
}

/// Data needed to create a target build record.
#[derive(Debug, Clone)]
pub struct NewBuildTarget {
    pub build_id: String,
    pub srpm_build_id: i64,
    pub target: String,
    pub owner: String,
    pub project_name: String,
    pub status: BuildStatus,
    pub web_url: Option<String>,
    pub task_accepted_time: Option<DateTime<Utc>>,
    pub project_event: ProjectEventRef,
}

/// Query over target build records. Unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct BuildFilter {
    pub commit_sha: Option<String>,
    pub project_name: Option<String>,
    pub owner: Option<String>,
    pub target: Option<String>,
    pub status: Option<BuildStatus>,
}

impl BuildFilter {
    pub fn matches(&self, record: &BuildTargetRecord) -> bool {
        self.commit_sha
            .as_ref()
            .is_none_or(|sha| *sha == record.project_event.commit_sha)
            && self
                .project_name
                .as_ref()
                .is_none_or(|p| *p == record.project_name)
            && self.owner.as_ref().is_none_or(|o| *o == record.owner)
            && self.target.as_ref().is_none_or(|t| *t == record.target)
            && self.status.is_none_or(|s| s == record.status)
    }
}
