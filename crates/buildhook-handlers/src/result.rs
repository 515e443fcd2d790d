//! Handler outcomes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Outcome of one handler run as stored with the task.
///
/// `success` says whether the job did what it was asked to. It carries no
/// retry decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResults {
    pub success: bool,
    pub details: Map<String, Value>,
}

impl TaskResults {
    pub fn ok(msg: impl Into<String>) -> Self {
        Self::with_msg(true, msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::with_msg(false, msg.into())
    }

    /// Success without anything worth saying.
    pub fn done() -> Self {
        Self {
            success: true,
            details: Map::new(),
        }
    }

    fn with_msg(success: bool, msg: String) -> Self {
        let mut details = Map::new();
        details.insert("msg".to_string(), Value::String(msg));
        Self { success, details }
    }

    pub fn msg(&self) -> Option<&str> {
        self.details.get("msg").and_then(Value::as_str)
    }
}

impl From<HandlerError> for TaskResults {
    fn from(err: HandlerError) -> Self {
        TaskResults::failed(err.to_string())
    }
}

/// Failure on the primary path of a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Core(#[from] buildhook_core::Error),

    #[error("invalid task payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("no handler for task {0}")]
    UnknownTask(String),
}

pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_kept_in_details() {
        let result = TaskResults::failed("RPMs failed to be built.");
        assert!(!result.success);
        assert_eq!(result.msg(), Some("RPMs failed to be built."));
        assert!(TaskResults::done().msg().is_none());
    }

    #[test]
    fn test_errors_become_failed_results() {
        let err = HandlerError::Core(buildhook_core::Error::BuildService(
            "copr is down".to_string(),
        ));
        let result = TaskResults::from(err);
        assert!(!result.success);
        assert_eq!(result.msg(), Some("build service error: copr is down"));
    }
}
