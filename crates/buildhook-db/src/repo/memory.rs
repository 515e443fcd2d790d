//! In-process build record store for dry runs and tests.

use async_trait::async_trait;
use buildhook_core::build::{
    BuildField, BuildFilter, BuildTargetRecord, NewBuildTarget, NewSrpmBuild, SrpmBuildRecord,
};
use buildhook_core::store::BuildStore;
use buildhook_core::{Error, Result};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    srpm_builds: Vec<SrpmBuildRecord>,
    targets: Vec<BuildTargetRecord>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// [`BuildStore`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryBuildRepo {
    state: RwLock<State>,
}

impl MemoryBuildRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every target record, oldest first.
    pub async fn all_targets(&self) -> Vec<BuildTargetRecord> {
        self.state.read().await.targets.clone()
    }
}

#[async_trait]
impl BuildStore for MemoryBuildRepo {
    async fn create_srpm_build(&self, new: NewSrpmBuild) -> Result<SrpmBuildRecord> {
        let mut state = self.state.write().await;
        let record = SrpmBuildRecord {
            id: state.allocate_id(),
            build_id: new.build_id,
            status: new.status,
            url: None,
            logs_url: None,
            web_url: new.web_url,
            build_start_time: None,
            build_finished_time: None,
            project_event: new.project_event,
        };
        state.srpm_builds.push(record.clone());
        Ok(record)
    }

    async fn create_build_target(&self, new: NewBuildTarget) -> Result<BuildTargetRecord> {
        let mut state = self.state.write().await;
        if state
            .targets
            .iter()
            .any(|t| t.build_id == new.build_id && t.target == new.target)
        {
            return Err(Error::InvalidInput(format!(
                "target {} of build {} already exists",
                new.target, new.build_id
            )));
        }

        let record = BuildTargetRecord {
            id: state.allocate_id(),
            build_id: new.build_id,
            srpm_build_id: new.srpm_build_id,
            target: new.target,
            owner: new.owner,
            project_name: new.project_name,
            status: new.status,
            web_url: new.web_url,
            build_logs_url: None,
            build_start_time: None,
            build_finished_time: None,
            built_packages: None,
            task_accepted_time: new.task_accepted_time,
            project_event: new.project_event,
        };
        state.targets.push(record.clone());
        Ok(record)
    }

    async fn get_srpm_build(&self, id: i64) -> Result<Option<SrpmBuildRecord>> {
        let state = self.state.read().await;
        Ok(state.srpm_builds.iter().find(|s| s.id == id).cloned())
    }

    async fn get_srpm_build_by_build_id(&self, build_id: &str) -> Result<Option<SrpmBuildRecord>> {
        let state = self.state.read().await;
        Ok(state
            .srpm_builds
            .iter()
            .rev()
            .find(|s| s.build_id.as_deref() == Some(build_id))
            .cloned())
    }

    async fn get_build_target(
        &self,
        build_id: &str,
        target: &str,
    ) -> Result<Option<BuildTargetRecord>> {
        let state = self.state.read().await;
        Ok(state
            .targets
            .iter()
            .find(|t| t.build_id == build_id && t.target == target)
            .cloned())
    }

    async fn get_all_by_build_id(&self, build_id: &str) -> Result<Vec<BuildTargetRecord>> {
        let state = self.state.read().await;
        Ok(state
            .targets
            .iter()
            .filter(|t| t.build_id == build_id)
            .cloned()
            .collect())
    }

    async fn get_all_by(&self, filter: &BuildFilter) -> Result<Vec<BuildTargetRecord>> {
        let state = self.state.read().await;
        Ok(state
            .targets
            .iter()
            .rev()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn update_srpm_build(&self, id: i64, field: BuildField) -> Result<()> {
        let mut state = self.state.write().await;
        let record = state
            .srpm_builds
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("srpm build {}", id)))?;
        record.apply(&field);
        Ok(())
    }

    async fn update_build_target(&self, id: i64, field: BuildField) -> Result<()> {
        let mut state = self.state.write().await;
        let record = state
            .targets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::NotFound(format!("build target {}", id)))?;
        record.apply(&field);
        Ok(())
    }
}
