//! Forge-visible status reporting.

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::Result;

/// State of a check run / commit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    #[display("pending")]
    Pending,
    #[display("running")]
    Running,
    #[display("success")]
    Success,
    #[display("failure")]
    Failure,
    #[display("error")]
    Error,
}

/// How to avoid posting the same comment twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateCheckMode {
    /// Always post.
    DoNotCheck,
    /// Skip when the newest comment has the same body.
    CheckLastComment,
}

/// One status update for one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub commit_sha: String,
    pub check_name: String,
    pub state: CommitState,
    pub description: String,
    pub url: String,
    /// Extra text shown with the check, where the forge supports it.
    pub markdown: Option<String>,
}

/// Destination of check-run updates.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(&self, report: &StatusReport) -> Result<()>;
}
