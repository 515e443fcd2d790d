//! Follow-up task submission.

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Names of tasks exchanged through the task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum TaskName {
    #[display("task.steve_jobs.process_message")]
    ProcessMessage,
    #[display("task.run_copr_build_handler")]
    CoprBuild,
    #[display("task.run_copr_build_start_handler")]
    CoprBuildStart,
    #[display("task.run_copr_build_end_handler")]
    CoprBuildEnd,
    #[display("task.run_testing_farm_handler")]
    TestingFarm,
}

impl std::str::FromStr for TaskName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [
            TaskName::ProcessMessage,
            TaskName::CoprBuild,
            TaskName::CoprBuildStart,
            TaskName::CoprBuildEnd,
            TaskName::TestingFarm,
        ]
        .into_iter()
        .find(|name| name.to_string() == s)
        .ok_or_else(|| format!("unknown task: {}", s))
    }
}

/// Fire-and-forget submission of follow-up work.
#[async_trait]
pub trait TaskSink: Send + Sync {
    async fn enqueue(&self, task: TaskName, payload: serde_json::Value) -> Result<()>;
}
