//! Error types for buildhook.

use thiserror::Error;

use crate::build::BuildStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: BuildStatus, to: BuildStatus },

    #[error("forge error: {0}")]
    Forge(String),

    #[error("build service error: {0}")]
    BuildService(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
