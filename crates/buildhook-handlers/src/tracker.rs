//! Build lifecycle state machine driven by build-service callbacks.
//!
//! Start and end callbacks move the SRPM record and the target records
//! through [`BuildStatus`]. Every callback may be delivered more than once, so
//! each transition first checks whether it was already applied.

use buildhook_core::build::{BuildField, BuildStatus, BuildTargetRecord, ProjectEventRef, SrpmBuildRecord};
use buildhook_core::event::BuildCallback;
use buildhook_core::job::TriggerType;
use buildhook_core::report::{CommitState, DuplicateCheckMode};
use buildhook_core::service::BuildTargetInfo;
use buildhook_core::{Error, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::best_effort::run_best_effort;
use crate::context::{CallbackRecord, HandlerContext, JobRun};
use crate::fanout::fan_out_tests;
use crate::reporter::BuildStatusReporter;
use crate::result::{HandlerError, HandlerResult, TaskResults};
use crate::scan::{ScanOrchestrator, should_scan};

const SRPM_FAILED: &str = "SRPM build failed, check the logs for details.";
const RPMS_FAILED: &str = "RPMs failed to be built.";
const RPMS_BUILT: &str = "RPMs were built successfully.";

pub fn congratulation_message(owner: &str, project: &str) -> String {
    format!(
        "Congratulations! One of the builds has completed. :champagne:\n\n\
         You can install the built RPMs by following these steps:\n\n\
         * `sudo yum install -y dnf-plugins-core` on RHEL 8\n\
         * `sudo dnf install -y dnf-plugins-core` on Fedora\n\
         * `dnf copr enable {}/{}`\n\
         * And now you can install the packages.\n\n\
         Please note that the RPMs should be used only in a testing environment.",
        owner, project
    )
}

/// Fill the `{packit_dashboard_url}`, `{external_dashboard_url}` and
/// `{logs_url}` placeholders of a configured failure comment.
pub fn render_failure_comment(
    template: &str,
    dashboard_url: &str,
    external_dashboard_url: &str,
    logs_url: &str,
) -> String {
    template
        .replace("{packit_dashboard_url}", dashboard_url)
        .replace("{external_dashboard_url}", external_dashboard_url)
        .replace("{logs_url}", logs_url)
}

fn elapsed_seconds(begin: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - begin).num_milliseconds() as f64 / 1000.0
}

/// Applies one callback to the records it refers to.
pub struct BuildTracker<'a> {
    ctx: &'a HandlerContext,
    run: &'a JobRun,
    cb: &'a BuildCallback,
}

impl<'a> BuildTracker<'a> {
    pub fn new(ctx: &'a HandlerContext, run: &'a JobRun) -> HandlerResult<Self> {
        let cb = run
            .callback()
            .ok_or_else(|| Error::InvalidInput("event is not a build callback".to_string()))?;
        Ok(Self { ctx, run, cb })
    }

    fn sync_test_statuses(&self) -> bool {
        self.run.job.sync_test_job_statuses_with_builds
    }

    fn reporter(&self, project_event: &ProjectEventRef) -> BuildStatusReporter<'a> {
        BuildStatusReporter::new(
            self.ctx,
            self.run,
            project_event.commit_sha.clone(),
            project_event.pr_id,
        )
    }

    fn event_time(&self) -> DateTime<Utc> {
        self.cb.timestamp_utc().unwrap_or_else(Utc::now)
    }

    fn logs_url(&self) -> String {
        self.cb.logs_url(&self.ctx.service.copr_url)
    }

    fn not_found(&self) -> TaskResults {
        let table = if self.cb.is_srpm() {
            "SRPMBuildDB"
        } else {
            "CoprBuildDB"
        };
        let msg = format!("Copr build {} not in {}.", self.cb.build_id, table);
        warn!(build_id = self.cb.build_id, target = %self.cb.target, "{}", msg);
        TaskResults::failed(msg)
    }

    /// Failure result when `from -> to` is not a legal move.
    fn reject_transition(&self, from: BuildStatus, to: BuildStatus) -> Option<TaskResults> {
        if from.can_transition_to(to) {
            return None;
        }
        warn!(
            build_id = self.cb.build_id,
            target = %self.cb.target,
            from = %from,
            to = %to,
            "Ignoring callback that does not fit the build state"
        );
        Some(HandlerError::from(Error::InvalidTransition { from, to }).into())
    }

    pub async fn handle_start(&self) -> HandlerResult<TaskResults> {
        let Some(record) = self.ctx.callback_record(self.cb).await? else {
            return Ok(self.not_found());
        };

        if record.has_started() {
            let msg = format!("Copr build start for {} is already processed.", self.cb.build_id);
            debug!("{}", msg);
            return Ok(TaskResults::ok(msg));
        }

        let start_time = self.event_time();
        match record {
            CallbackRecord::Srpm(srpm) => self.srpm_started(srpm, start_time).await,
            CallbackRecord::Target(target) => self.target_started(target, start_time).await,
        }
    }

    async fn srpm_started(
        &self,
        srpm: SrpmBuildRecord,
        start_time: DateTime<Utc>,
    ) -> HandlerResult<TaskResults> {
        let store = &self.ctx.store;

        if srpm.status.is_final() {
            store
                .update_srpm_build(srpm.id, BuildField::StartTime(start_time))
                .await?;
            return Ok(TaskResults::ok(
                "Copr build start is being processed, but the build is already in the final state, setting only start time.",
            ));
        }
        if let Some(rejected) = self.reject_transition(srpm.status, BuildStatus::Running) {
            return Ok(rejected);
        }

        store
            .update_srpm_build(srpm.id, BuildField::LogsUrl(self.logs_url()))
            .await?;

        let reporter = self.reporter(&srpm.project_event);
        let url = self.ctx.service.srpm_dashboard_url(srpm.id);
        let description = "SRPM build is in progress...";
        if self.sync_test_statuses() {
            reporter
                .report_status_to_all(CommitState::Running, description, &url)
                .await?;
        } else {
            reporter
                .report_status_to_build(CommitState::Running, description, &url)
                .await?;
        }

        store
            .update_srpm_build(srpm.id, BuildField::Status(BuildStatus::Running))
            .await?;
        store
            .update_srpm_build(srpm.id, BuildField::StartTime(start_time))
            .await?;

        info!(build_id = self.cb.build_id, "SRPM build started");
        Ok(TaskResults::ok("SRPM build in Copr has started..."))
    }

    async fn target_started(
        &self,
        target: BuildTargetRecord,
        start_time: DateTime<Utc>,
    ) -> HandlerResult<TaskResults> {
        let store = &self.ctx.store;

        if target.status.is_final() {
            store
                .update_build_target(target.id, BuildField::StartTime(start_time))
                .await?;
            return Ok(TaskResults::ok(
                "Copr build start is being processed, but the build is already in the final state, setting only start time.",
            ));
        }
        if let Some(rejected) = self.reject_transition(target.status, BuildStatus::Running) {
            return Ok(rejected);
        }

        self.ctx.telemetry.builds_started();
        store
            .update_build_target(target.id, BuildField::Status(BuildStatus::Running))
            .await?;
        store
            .update_build_target(target.id, BuildField::LogsUrl(self.logs_url()))
            .await?;

        let reporter = self.reporter(&target.project_event);
        let url = self.ctx.service.build_dashboard_url(target.id);
        let description = "RPM build is in progress...";
        if self.sync_test_statuses() {
            reporter
                .report_status_to_all_for_chroot(CommitState::Running, description, &url, &target.target)
                .await?;
        } else {
            reporter
                .report_status_to_build_for_chroot(CommitState::Running, description, &url, &target.target)
                .await?;
        }

        store
            .update_build_target(target.id, BuildField::StartTime(start_time))
            .await?;

        info!(build_id = self.cb.build_id, target = %target.target, "Target build started");
        Ok(TaskResults::ok(format!(
            "Build on {} in copr has started...",
            target.target
        )))
    }

    pub async fn handle_end(&self) -> HandlerResult<TaskResults> {
        let Some(record) = self.ctx.callback_record(self.cb).await? else {
            return Ok(self.not_found());
        };

        let status = match &record {
            CallbackRecord::Srpm(srpm) => srpm.status,
            CallbackRecord::Target(target) => target.status,
        };
        if status.is_final() {
            let msg = format!(
                "Copr build {} is already processed (status={}).",
                self.cb.build_id, status
            );
            info!("{}", msg);
            return Ok(TaskResults::ok(msg));
        }

        match record {
            CallbackRecord::Srpm(srpm) => self.srpm_ended(srpm).await,
            CallbackRecord::Target(target) => self.target_ended(target).await,
        }
    }

    /// Remember where the built SRPM can be downloaded from.
    async fn resolve_srpm_url(&self, srpm: &mut SrpmBuildRecord) -> Result<()> {
        if srpm.url.is_some() {
            return Ok(());
        }
        let build = self.ctx.build_service.get_build(self.cb.build_id).await?;
        if let Some(url) = build.source_package_url {
            self.ctx
                .store
                .update_srpm_build(srpm.id, BuildField::Url(url.clone()))
                .await?;
            srpm.url = Some(url);
        }
        Ok(())
    }

    async fn srpm_ended(&self, mut srpm: SrpmBuildRecord) -> HandlerResult<TaskResults> {
        let store = &self.ctx.store;
        let next = if self.cb.succeeded() {
            BuildStatus::Success
        } else {
            BuildStatus::Failure
        };
        if let Some(rejected) = self.reject_transition(srpm.status, next) {
            return Ok(rejected);
        }

        store
            .update_srpm_build(srpm.id, BuildField::EndTime(self.event_time()))
            .await?;
        self.resolve_srpm_url(&mut srpm).await?;

        let reporter = self.reporter(&srpm.project_event);
        let url = self.ctx.service.srpm_dashboard_url(srpm.id);
        let siblings = store
            .get_all_by_build_id(&self.cb.build_id.to_string())
            .await?;

        if next == BuildStatus::Failure {
            reporter
                .report_status_to_all(CommitState::Failure, SRPM_FAILED, &url)
                .await?;
            let logs_url = srpm.logs_url.clone().unwrap_or_else(|| self.logs_url());
            self.notify_about_failure(
                &reporter,
                &url,
                srpm.web_url.as_deref().unwrap_or_default(),
                &logs_url,
            )
            .await;
            store
                .update_srpm_build(srpm.id, BuildField::Status(BuildStatus::Failure))
                .await?;
            self.ctx
                .telemetry
                .builds_not_submitted(siblings.len(), "srpm_failure");

            info!(build_id = self.cb.build_id, "SRPM build failed");
            return Ok(TaskResults::failed(SRPM_FAILED));
        }

        for target in siblings
            .iter()
            .filter(|t| t.status == BuildStatus::WaitingForSrpm)
        {
            store
                .update_build_target(target.id, BuildField::Status(BuildStatus::Pending))
                .await?;
        }
        store
            .update_srpm_build(srpm.id, BuildField::Status(BuildStatus::Success))
            .await?;

        let description = "SRPM build succeeded. Waiting for RPM build to start...";
        if self.sync_test_statuses() {
            reporter
                .report_status_to_all(CommitState::Running, description, &url)
                .await?;
        } else {
            reporter
                .report_status_to_build(CommitState::Running, description, &url)
                .await?;
        }

        let msg = "SRPM build in Copr has finished.";
        debug!(build_id = self.cb.build_id, "{}", msg);
        Ok(TaskResults::ok(msg))
    }

    async fn target_ended(&self, target: BuildTargetRecord) -> HandlerResult<TaskResults> {
        let store = &self.ctx.store;
        let next = if self.cb.succeeded() {
            BuildStatus::Success
        } else {
            BuildStatus::Failure
        };
        if let Some(rejected) = self.reject_transition(target.status, next) {
            return Ok(rejected);
        }

        store
            .update_build_target(target.id, BuildField::EndTime(self.event_time()))
            .await?;
        let mut srpm = store
            .get_srpm_build(target.srpm_build_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("srpm build {}", target.srpm_build_id)))?;
        self.resolve_srpm_url(&mut srpm).await?;

        self.ctx.telemetry.builds_finished();
        // Builds that only serve test jobs have no acceptance time.
        if let Some(accepted) = target.task_accepted_time {
            self.ctx
                .telemetry
                .observe_build_finished_time(elapsed_seconds(accepted, Utc::now()));
        }

        let reporter = self.reporter(&target.project_event);
        let url = self.ctx.service.build_dashboard_url(target.id);
        let chroot = target.target.as_str();

        if next == BuildStatus::Failure {
            // The SRPM failure was already reported and notified about.
            if srpm.status != BuildStatus::Failure {
                reporter
                    .report_status_to_all_for_chroot(CommitState::Failure, RPMS_FAILED, &url, chroot)
                    .await?;
                self.observe_reporting_delay().await?;
                let logs_url = target
                    .build_logs_url
                    .clone()
                    .unwrap_or_else(|| self.logs_url());
                self.notify_about_failure(
                    &reporter,
                    &url,
                    target.web_url.as_deref().unwrap_or_default(),
                    &logs_url,
                )
                .await;
            }
            store
                .update_build_target(target.id, BuildField::Status(BuildStatus::Failure))
                .await?;

            info!(build_id = self.cb.build_id, target = chroot, "Target build failed");
            return Ok(TaskResults::failed(RPMS_FAILED));
        }

        self.congratulate(&reporter).await?;

        reporter
            .report_status_to_build_for_chroot(CommitState::Success, RPMS_BUILT, &url, chroot)
            .await?;
        if self.sync_test_statuses() {
            reporter
                .report_status_to_all_test_jobs_for_chroot(CommitState::Pending, RPMS_BUILT, &url, chroot)
                .await?;
        }
        let target_info = self.observe_reporting_delay().await?;

        if target.built_packages.is_none() {
            store
                .update_build_target(
                    target.id,
                    BuildField::BuiltPackages(target_info.built_packages),
                )
                .await?;
        }
        store
            .update_build_target(target.id, BuildField::Status(BuildStatus::Success))
            .await?;
        info!(build_id = self.cb.build_id, target = chroot, "Target build succeeded");

        fan_out_tests(self.ctx, self.run, &target).await?;

        if should_scan(self.ctx, self.run, &target) {
            let scan = ScanOrchestrator::new(self.ctx, self.run, &target, &reporter);
            run_best_effort(self.ctx.telemetry.as_ref(), "scan", scan.handle_scan()).await;
        }

        Ok(TaskResults::done())
    }

    /// Observe how long after the build ended its result reached the forge.
    async fn observe_reporting_delay(&self) -> Result<BuildTargetInfo> {
        let info = self
            .ctx
            .build_service
            .get_build_target(self.cb.build_id, &self.cb.target)
            .await?;
        match info.ended_on {
            Some(ended_on) => self
                .ctx
                .telemetry
                .observe_build_end_reported_after(elapsed_seconds(ended_on, Utc::now())),
            None => debug!(target = %self.cb.target, "Build end time unknown, skipping delay metric"),
        }
        Ok(info)
    }

    async fn congratulate(&self, reporter: &BuildStatusReporter<'_>) -> Result<()> {
        if self.run.job.trigger != TriggerType::PullRequest
            || !self.run.job.notifications.successful_build
        {
            return Ok(());
        }
        reporter
            .comment(
                &congratulation_message(&self.cb.owner, &self.cb.project),
                DuplicateCheckMode::CheckLastComment,
            )
            .await
    }

    async fn notify_about_failure(
        &self,
        reporter: &BuildStatusReporter<'_>,
        dashboard_url: &str,
        external_dashboard_url: &str,
        logs_url: &str,
    ) {
        let Some(template) = &self.run.job.notifications.failure_comment else {
            return;
        };
        let body = render_failure_comment(template, dashboard_url, external_dashboard_url, logs_url);
        run_best_effort(
            self.ctx.telemetry.as_ref(),
            "failure_notification",
            reporter.comment(&body, DuplicateCheckMode::CheckLastComment),
        )
        .await;
    }
}
