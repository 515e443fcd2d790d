//! Queue errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid task payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<QueueError> for buildhook_core::Error {
    fn from(err: QueueError) -> Self {
        buildhook_core::Error::Queue(err.to_string())
    }
}
