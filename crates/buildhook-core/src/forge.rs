//! Forge project abstraction (GitHub, GitLab, Pagure).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Git forge flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgeKind {
    Github,
    Gitlab,
    Pagure,
}

impl ForgeKind {
    /// Whether build results are announced with pull request comments.
    pub fn supports_comments(self) -> bool {
        matches!(self, ForgeKind::Github | ForgeKind::Gitlab)
    }
}

impl std::fmt::Display for ForgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForgeKind::Github => write!(f, "github"),
            ForgeKind::Gitlab => write!(f, "gitlab"),
            ForgeKind::Pagure => write!(f, "pagure"),
        }
    }
}

/// Pull request details needed while handling a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub target_branch: String,
    pub target_branch_head_commit: String,
    pub labels: Vec<String>,
}

/// A repository on a forge.
#[async_trait]
pub trait ForgeProject: Send + Sync {
    fn kind(&self) -> ForgeKind;

    fn namespace(&self) -> &str;

    fn repo(&self) -> &str;

    /// URL the build service clones sources from.
    fn clone_url(&self) -> String;

    async fn default_branch(&self) -> Result<String>;

    async fn get_pr(&self, id: u64) -> Result<PullRequest>;

    /// Logins allowed to trigger jobs in this project.
    async fn who_can_act(&self) -> Result<Vec<String>>;

    async fn post_comment(&self, pr_id: u64, body: &str) -> Result<()>;

    /// Body of the newest comment on the pull request, if any.
    async fn last_comment(&self, pr_id: u64) -> Result<Option<String>>;
}
