//! Hand-written collaborator fakes shared by the handler tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use buildhook_config::ServiceConfig;
use buildhook_core::build::{
    BuildStatus, BuildTargetRecord, NewBuildTarget, NewSrpmBuild, ProjectEventRef,
    SrpmBuildRecord,
};
use buildhook_core::event::{BuildCallback, Event, EventKind, ForgeIdentity, PullRequestAction};
use buildhook_core::forge::{ForgeKind, ForgeProject, PullRequest};
use buildhook_core::job::{JobConfig, JobType, PackageConfig, TriggerType};
use buildhook_core::report::{StatusReport, StatusSink};
use buildhook_core::service::{
    ArtifactDownloader, BuildInfo, BuildRequest, BuildService, BuildTargetInfo, SubmittedBuild,
};
use buildhook_core::store::BuildStore;
use buildhook_core::task::{TaskName, TaskSink};
use buildhook_core::telemetry::Telemetry;
use buildhook_core::{Error, Result};
use buildhook_db::MemoryBuildRepo;
use chrono::{DateTime, Utc};

use crate::context::{HandlerContext, JobRun};

pub const NAMESPACE: &str = "the-namespace";
pub const REPO: &str = "the-repo";
pub const PR_ID: u64 = 342;
pub const HEAD_SHA: &str = "f00dcafe";
pub const BUILD_ID: u64 = 4242;
pub const OWNER: &str = "packit";
pub const PROJECT: &str = "the-namespace-the-repo-342";
pub const RAWHIDE: &str = "fedora-rawhide-x86_64";
pub const F40: &str = "fedora-40-x86_64";

pub struct FakeForge {
    pub kind: Mutex<ForgeKind>,
    pub default_branch: Mutex<String>,
    pub prs: Mutex<HashMap<u64, PullRequest>>,
    pub actors: Mutex<Vec<String>>,
    pub comments: Mutex<Vec<(u64, String)>>,
}

impl Default for FakeForge {
    fn default() -> Self {
        let mut prs = HashMap::new();
        prs.insert(
            PR_ID,
            PullRequest {
                id: PR_ID,
                target_branch: "main".to_string(),
                target_branch_head_commit: "abcdef".to_string(),
                labels: Vec::new(),
            },
        );
        Self {
            kind: Mutex::new(ForgeKind::Github),
            default_branch: Mutex::new("main".to_string()),
            prs: Mutex::new(prs),
            actors: Mutex::new(vec!["maintainer".to_string()]),
            comments: Mutex::new(Vec::new()),
        }
    }
}

impl FakeForge {
    pub fn set_labels(&self, labels: &[&str]) {
        if let Some(pr) = self.prs.lock().unwrap().get_mut(&PR_ID) {
            pr.labels = labels.iter().map(|l| l.to_string()).collect();
        }
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl ForgeProject for FakeForge {
    fn kind(&self) -> ForgeKind {
        *self.kind.lock().unwrap()
    }

    fn namespace(&self) -> &str {
        NAMESPACE
    }

    fn repo(&self) -> &str {
        REPO
    }

    fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", NAMESPACE, REPO)
    }

    async fn default_branch(&self) -> Result<String> {
        Ok(self.default_branch.lock().unwrap().clone())
    }

    async fn get_pr(&self, id: u64) -> Result<PullRequest> {
        self.prs
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("pull request {}", id)))
    }

    async fn who_can_act(&self) -> Result<Vec<String>> {
        Ok(self.actors.lock().unwrap().clone())
    }

    async fn post_comment(&self, pr_id: u64, body: &str) -> Result<()> {
        self.comments
            .lock()
            .unwrap()
            .push((pr_id, body.to_string()));
        Ok(())
    }

    async fn last_comment(&self, pr_id: u64) -> Result<Option<String>> {
        Ok(self
            .comments
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(pr, _)| *pr == pr_id)
            .map(|(_, body)| body.clone()))
    }
}

/// A scan submission as the build service saw it.
#[derive(Debug, Clone)]
pub struct ScanCall {
    pub srpm: PathBuf,
    pub base_srpm: PathBuf,
    pub comment: String,
    pub srpm_existed: bool,
    pub base_srpm_existed: bool,
}

#[derive(Default)]
pub struct FakeBuildService {
    pub srpm_urls: Mutex<HashMap<u64, String>>,
    pub targets: Mutex<HashMap<(u64, String), BuildTargetInfo>>,
    pub submit_error: Mutex<Option<String>>,
    pub submitted: Mutex<Vec<BuildRequest>>,
    pub scan_output: Mutex<Option<String>>,
    pub scan_error: Mutex<Option<String>>,
    pub scans: Mutex<Vec<ScanCall>>,
}

impl FakeBuildService {
    pub fn set_srpm_url(&self, build_id: u64, url: &str) {
        self.srpm_urls
            .lock()
            .unwrap()
            .insert(build_id, url.to_string());
    }

    pub fn set_target_info(&self, build_id: u64, target: &str, info: BuildTargetInfo) {
        self.targets
            .lock()
            .unwrap()
            .insert((build_id, target.to_string()), info);
    }

    pub fn set_scan_output(&self, output: &str) {
        *self.scan_output.lock().unwrap() = Some(output.to_string());
    }

    pub fn scans(&self) -> Vec<ScanCall> {
        self.scans.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<BuildRequest> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildService for FakeBuildService {
    async fn get_build(&self, build_id: u64) -> Result<BuildInfo> {
        Ok(BuildInfo {
            id: build_id,
            state: "succeeded".to_string(),
            source_package_url: self.srpm_urls.lock().unwrap().get(&build_id).cloned(),
        })
    }

    async fn get_build_target(&self, build_id: u64, target: &str) -> Result<BuildTargetInfo> {
        Ok(self
            .targets
            .lock()
            .unwrap()
            .get(&(build_id, target.to_string()))
            .cloned()
            .unwrap_or(BuildTargetInfo {
                ended_on: None,
                built_packages: Vec::new(),
            }))
    }

    async fn submit_build(&self, request: &BuildRequest) -> Result<SubmittedBuild> {
        if let Some(message) = self.submit_error.lock().unwrap().clone() {
            return Err(Error::BuildService(message));
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(request.clone());
        let build_id = BUILD_ID + submitted.len() as u64 - 1;
        Ok(SubmittedBuild {
            build_id,
            web_url: format!("https://copr.example.org/coprs/build/{}", build_id),
        })
    }

    async fn submit_scan(
        &self,
        srpm: &Path,
        base_srpm: &Path,
        comment: &str,
    ) -> Result<Option<String>> {
        if let Some(message) = self.scan_error.lock().unwrap().clone() {
            return Err(Error::BuildService(message));
        }
        self.scans.lock().unwrap().push(ScanCall {
            srpm: srpm.to_path_buf(),
            base_srpm: base_srpm.to_path_buf(),
            comment: comment.to_string(),
            srpm_existed: srpm.exists(),
            base_srpm_existed: base_srpm.exists(),
        });
        Ok(self.scan_output.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeDownloader {
    pub failing: Mutex<Vec<String>>,
    pub downloads: Mutex<Vec<String>>,
}

impl FakeDownloader {
    pub fn fail_for(&self, url: &str) {
        self.failing.lock().unwrap().push(url.to_string());
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactDownloader for FakeDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.downloads.lock().unwrap().push(url.to_string());
        if self.failing.lock().unwrap().iter().any(|u| u == url) {
            return Err(Error::Download(format!("{} returned 404", url)));
        }
        tokio::fs::write(dest, b"srpm")
            .await
            .map_err(|e| Error::Download(e.to_string()))
    }
}

#[derive(Default)]
pub struct RecordingStatusSink {
    pub reports: Mutex<Vec<StatusReport>>,
}

impl RecordingStatusSink {
    pub fn reports(&self) -> Vec<StatusReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn for_check(&self, check_name: &str) -> Vec<StatusReport> {
        self.reports()
            .into_iter()
            .filter(|r| r.check_name == check_name)
            .collect()
    }

    pub fn check_names(&self) -> Vec<String> {
        self.reports().into_iter().map(|r| r.check_name).collect()
    }
}

#[async_trait]
impl StatusSink for RecordingStatusSink {
    async fn report(&self, report: &StatusReport) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTaskSink {
    pub tasks: Mutex<Vec<(TaskName, serde_json::Value)>>,
}

impl RecordingTaskSink {
    pub fn tasks(&self) -> Vec<(TaskName, serde_json::Value)> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskSink for RecordingTaskSink {
    async fn enqueue(&self, task: TaskName, payload: serde_json::Value) -> Result<()> {
        self.tasks.lock().unwrap().push((task, payload));
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Counts {
    pub started: usize,
    pub finished: usize,
    pub not_submitted: Vec<(usize, String)>,
    pub finished_time_samples: usize,
    pub reported_after_samples: usize,
}

#[derive(Default)]
pub struct RecordingTelemetry {
    pub counts: Mutex<Counts>,
    pub errors: Mutex<Vec<(String, String)>>,
}

impl RecordingTelemetry {
    pub fn counts(&self) -> Counts {
        self.counts.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(String, String)> {
        self.errors.lock().unwrap().clone()
    }
}

impl Telemetry for RecordingTelemetry {
    fn builds_started(&self) {
        self.counts.lock().unwrap().started += 1;
    }

    fn builds_finished(&self) {
        self.counts.lock().unwrap().finished += 1;
    }

    fn builds_not_submitted(&self, count: usize, reason: &str) {
        self.counts
            .lock()
            .unwrap()
            .not_submitted
            .push((count, reason.to_string()));
    }

    fn observe_build_finished_time(&self, _seconds: f64) {
        self.counts.lock().unwrap().finished_time_samples += 1;
    }

    fn observe_build_end_reported_after(&self, _seconds: f64) {
        self.counts.lock().unwrap().reported_after_samples += 1;
    }

    fn report_error(&self, source: &str, error: &(dyn std::error::Error + 'static)) {
        self.errors
            .lock()
            .unwrap()
            .push((source.to_string(), error.to_string()));
    }
}

/// A [`HandlerContext`] wired to fakes, with handles to inspect them.
pub struct Harness {
    pub ctx: HandlerContext,
    pub forge: Arc<FakeForge>,
    pub builds: Arc<FakeBuildService>,
    pub downloader: Arc<FakeDownloader>,
    pub store: Arc<MemoryBuildRepo>,
    pub status: Arc<RecordingStatusSink>,
    pub tasks: Arc<RecordingTaskSink>,
    pub telemetry: Arc<RecordingTelemetry>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_service(ServiceConfig::default())
    }

    pub fn with_service(service: ServiceConfig) -> Self {
        let forge = Arc::new(FakeForge::default());
        let builds = Arc::new(FakeBuildService::default());
        let downloader = Arc::new(FakeDownloader::default());
        let store = Arc::new(MemoryBuildRepo::new());
        let status = Arc::new(RecordingStatusSink::default());
        let tasks = Arc::new(RecordingTaskSink::default());
        let telemetry = Arc::new(RecordingTelemetry::default());

        let ctx = HandlerContext {
            service: Arc::new(service),
            forge: forge.clone(),
            build_service: builds.clone(),
            downloader: downloader.clone(),
            store: store.clone(),
            status: status.clone(),
            tasks: tasks.clone(),
            telemetry: telemetry.clone(),
        };

        Self {
            ctx,
            forge,
            builds,
            downloader,
            store,
            status,
            tasks,
            telemetry,
        }
    }

    /// Create an SRPM record and one waiting target record per target.
    pub async fn seed_build(
        &self,
        build_id: u64,
        targets: &[&str],
        project_event: ProjectEventRef,
    ) -> (SrpmBuildRecord, Vec<BuildTargetRecord>) {
        self.seed_build_in(build_id, targets, OWNER, PROJECT, project_event)
            .await
    }

    pub async fn seed_build_in(
        &self,
        build_id: u64,
        targets: &[&str],
        owner: &str,
        project: &str,
        project_event: ProjectEventRef,
    ) -> (SrpmBuildRecord, Vec<BuildTargetRecord>) {
        let srpm = self
            .store
            .create_srpm_build(NewSrpmBuild {
                build_id: Some(build_id.to_string()),
                status: BuildStatus::Pending,
                web_url: Some(format!("https://copr.example.org/coprs/build/{}", build_id)),
                project_event: project_event.clone(),
            })
            .await
            .unwrap();

        let mut records = Vec::new();
        for target in targets {
            records.push(
                self.store
                    .create_build_target(NewBuildTarget {
                        build_id: build_id.to_string(),
                        srpm_build_id: srpm.id,
                        target: target.to_string(),
                        owner: owner.to_string(),
                        project_name: project.to_string(),
                        status: BuildStatus::WaitingForSrpm,
                        web_url: None,
                        task_accepted_time: Some(accepted_at()),
                        project_event: project_event.clone(),
                    })
                    .await
                    .unwrap(),
            );
        }
        (srpm, records)
    }

    pub async fn srpm(&self, id: i64) -> SrpmBuildRecord {
        self.store.get_srpm_build(id).await.unwrap().unwrap()
    }

    pub async fn target(&self, build_id: u64, target: &str) -> BuildTargetRecord {
        self.store
            .get_build_target(&build_id.to_string(), target)
            .await
            .unwrap()
            .unwrap()
    }
}

pub fn accepted_at() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn forge_identity(pr_id: Option<u64>) -> ForgeIdentity {
    ForgeIdentity {
        forge: ForgeKind::Github,
        namespace: NAMESPACE.to_string(),
        repo: REPO.to_string(),
        commit_sha: HEAD_SHA.to_string(),
        pr_id,
        actor: Some("maintainer".to_string()),
    }
}

pub fn pr_event() -> Event {
    Event {
        kind: EventKind::PullRequest {
            action: PullRequestAction::Synchronize,
            target_branch: "main".to_string(),
        },
        forge: forge_identity(Some(PR_ID)),
        accepted_at: Some(accepted_at()),
    }
}

pub fn push_event(branch: &str) -> Event {
    Event {
        kind: EventKind::Push {
            branch: branch.to_string(),
        },
        forge: forge_identity(None),
        accepted_at: Some(accepted_at()),
    }
}

pub fn comment_event(command: &str) -> Event {
    Event {
        kind: EventKind::Comment {
            command: command.to_string(),
        },
        forge: forge_identity(Some(PR_ID)),
        accepted_at: Some(accepted_at()),
    }
}

pub fn callback(target: &str, status: i32) -> BuildCallback {
    BuildCallback {
        build_id: BUILD_ID,
        target: target.to_string(),
        owner: OWNER.to_string(),
        project: PROJECT.to_string(),
        package: Some("python-foo".to_string()),
        timestamp: Some(1_714_557_600),
        status,
    }
}

pub fn start_event(target: &str) -> Event {
    Event {
        kind: EventKind::BuildStart(callback(target, 0)),
        forge: forge_identity(Some(PR_ID)),
        accepted_at: None,
    }
}

pub fn end_event(target: &str, status: i32) -> Event {
    Event {
        kind: EventKind::BuildEnd(callback(target, status)),
        forge: forge_identity(Some(PR_ID)),
        accepted_at: None,
    }
}

pub fn pr_project_event() -> ProjectEventRef {
    pr_event().project_event_ref()
}

pub fn build_job() -> JobConfig {
    JobConfig::new(JobType::CoprBuild, TriggerType::PullRequest).with_targets([RAWHIDE, F40])
}

pub fn tests_job(targets: &[&str]) -> JobConfig {
    JobConfig::new(JobType::Tests, TriggerType::PullRequest).with_targets(targets.iter().copied())
}

pub fn package_config(jobs: Vec<JobConfig>) -> PackageConfig {
    PackageConfig {
        package: Some("python-foo".to_string()),
        jobs,
    }
}

pub fn job_run(jobs: Vec<JobConfig>, job: JobConfig, event: Event) -> JobRun {
    JobRun::new(package_config(jobs), job, event)
}
