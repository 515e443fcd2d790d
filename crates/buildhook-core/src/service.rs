//! Build service abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Result;
use crate::build::BuiltPackage;

/// State of a build as the build service sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildInfo {
    pub id: u64,
    pub state: String,
    pub source_package_url: Option<String>,
}

/// State of one target of a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTargetInfo {
    pub ended_on: Option<DateTime<Utc>>,
    pub built_packages: Vec<BuiltPackage>,
}

/// Request to build a commit for a set of targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    pub owner: String,
    pub project: String,
    pub clone_url: String,
    pub committish: String,
    pub targets: Vec<String>,
}

/// What the build service returned for an accepted build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedBuild {
    pub build_id: u64,
    pub web_url: String,
}

/// Remote build service client.
#[async_trait]
pub trait BuildService: Send + Sync {
    async fn get_build(&self, build_id: u64) -> Result<BuildInfo>;

    async fn get_build_target(&self, build_id: u64, target: &str) -> Result<BuildTargetInfo>;

    async fn submit_build(&self, request: &BuildRequest) -> Result<SubmittedBuild>;

    /// Submit a differential scan of `srpm` against `base_srpm`.
    ///
    /// Returns the raw text output of the scan service, `None` when it
    /// produced nothing.
    async fn submit_scan(
        &self,
        srpm: &Path,
        base_srpm: &Path,
        comment: &str,
    ) -> Result<Option<String>>;
}

/// Fetches build artifacts to local disk.
#[async_trait]
pub trait ArtifactDownloader: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}
