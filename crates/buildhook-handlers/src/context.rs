//! Collaborators and inputs shared by checkers and handlers.

use std::sync::Arc;

use buildhook_config::ServiceConfig;
use buildhook_core::build::{BuildTargetRecord, ProjectEventKind, ProjectEventRef, SrpmBuildRecord};
use buildhook_core::event::{BuildCallback, Event};
use buildhook_core::forge::ForgeProject;
use buildhook_core::job::{JobConfig, PackageConfig, TriggerType};
use buildhook_core::report::StatusSink;
use buildhook_core::service::{ArtifactDownloader, BuildService};
use buildhook_core::store::BuildStore;
use buildhook_core::task::TaskSink;
use buildhook_core::telemetry::Telemetry;
use buildhook_core::Result;
use serde::{Deserialize, Serialize};

/// Everything a handler talks to.
#[derive(Clone)]
pub struct HandlerContext {
    pub service: Arc<ServiceConfig>,
    pub forge: Arc<dyn ForgeProject>,
    pub build_service: Arc<dyn BuildService>,
    pub downloader: Arc<dyn ArtifactDownloader>,
    pub store: Arc<dyn BuildStore>,
    pub status: Arc<dyn StatusSink>,
    pub tasks: Arc<dyn TaskSink>,
    pub telemetry: Arc<dyn Telemetry>,
}

/// A build record a callback refers to.
#[derive(Debug, Clone)]
pub enum CallbackRecord {
    Srpm(SrpmBuildRecord),
    Target(BuildTargetRecord),
}

impl CallbackRecord {
    pub fn project_event(&self) -> &ProjectEventRef {
        match self {
            CallbackRecord::Srpm(srpm) => &srpm.project_event,
            CallbackRecord::Target(target) => &target.project_event,
        }
    }

    pub fn has_started(&self) -> bool {
        match self {
            CallbackRecord::Srpm(srpm) => srpm.build_start_time.is_some(),
            CallbackRecord::Target(target) => target.build_start_time.is_some(),
        }
    }
}

impl HandlerContext {
    /// Look up the record a callback is about: the SRPM build for the
    /// `srpm-builds` pseudo-target, the target build otherwise.
    pub async fn callback_record(&self, cb: &BuildCallback) -> Result<Option<CallbackRecord>> {
        let build_id = cb.build_id.to_string();
        if cb.is_srpm() {
            Ok(self
                .store
                .get_srpm_build_by_build_id(&build_id)
                .await?
                .map(CallbackRecord::Srpm))
        } else {
            Ok(self
                .store
                .get_build_target(&build_id, &cb.target)
                .await?
                .map(CallbackRecord::Target))
        }
    }

    /// Trigger type an event runs jobs for. Callbacks inherit it from the
    /// event that started the build.
    pub async fn effective_trigger(&self, event: &Event) -> Result<Option<TriggerType>> {
        if let Some(trigger) = event.trigger_type() {
            return Ok(Some(trigger));
        }
        let Some(cb) = event.callback() else {
            return Ok(None);
        };
        Ok(self
            .callback_record(cb)
            .await?
            .map(|record| trigger_of(record.project_event())))
    }
}

pub fn trigger_of(event: &ProjectEventRef) -> TriggerType {
    match event.kind {
        ProjectEventKind::PullRequest => TriggerType::PullRequest,
        ProjectEventKind::BranchPush => TriggerType::Commit,
        ProjectEventKind::Release => TriggerType::Release,
    }
}

/// One job to run for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub package_config: PackageConfig,
    pub job: JobConfig,
    pub event: Event,
}

impl JobRun {
    pub fn new(package_config: PackageConfig, job: JobConfig, event: Event) -> Self {
        Self {
            package_config,
            job,
            event,
        }
    }

    pub fn callback(&self) -> Option<&BuildCallback> {
        self.event.callback()
    }
}
