//! Storage of build records.

use async_trait::async_trait;

use crate::Result;
use crate::build::{
    BuildField, BuildFilter, BuildTargetRecord, NewBuildTarget, NewSrpmBuild, SrpmBuildRecord,
};

/// Persistence of SRPM and target build records.
///
/// Every update touches one field of one record; atomicity of that single
/// update is the implementation's responsibility.
#[async_trait]
pub trait BuildStore: Send + Sync {
    async fn create_srpm_build(&self, new: NewSrpmBuild) -> Result<SrpmBuildRecord>;

    async fn create_build_target(&self, new: NewBuildTarget) -> Result<BuildTargetRecord>;

    async fn get_srpm_build(&self, id: i64) -> Result<Option<SrpmBuildRecord>>;

    async fn get_srpm_build_by_build_id(&self, build_id: &str)
    -> Result<Option<SrpmBuildRecord>>;

    async fn get_build_target(
        &self,
        build_id: &str,
        target: &str,
    ) -> Result<Option<BuildTargetRecord>>;

    /// All targets of one build.
    async fn get_all_by_build_id(&self, build_id: &str) -> Result<Vec<BuildTargetRecord>>;

    /// Target records matching the filter, newest first.
    async fn get_all_by(&self, filter: &BuildFilter) -> Result<Vec<BuildTargetRecord>>;

    async fn update_srpm_build(&self, id: i64, field: BuildField) -> Result<()>;

    async fn update_build_target(&self, id: i64, field: BuildField) -> Result<()>;
}
