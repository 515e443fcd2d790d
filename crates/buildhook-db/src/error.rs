//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("malformed row: {0}")]
    Serialization(String),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for buildhook_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => buildhook_core::Error::NotFound(what),
            other => buildhook_core::Error::Storage(other.to_string()),
        }
    }
}
