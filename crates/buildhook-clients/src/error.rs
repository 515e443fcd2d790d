//! Client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Request(err.to_string())
    }
}

/// Turn a client error into the core error of the given collaborator kind.
pub(crate) fn into_core(
    err: ClientError,
    kind: fn(String) -> buildhook_core::Error,
) -> buildhook_core::Error {
    match err {
        ClientError::NotFound(what) => buildhook_core::Error::NotFound(what),
        other => kind(other.to_string()),
    }
}
