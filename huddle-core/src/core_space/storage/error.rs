//! Storage errors

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Another writer held the database past the busy timeout
    #[error("Database is busy")]
    Busy,

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("SQL error: {0}")]
    Sql(rusqlite::Error),

    #[error("Migration v{version} failed: {source}")]
    Migration {
        version: i32,
        #[source]
        source: rusqlite::Error,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreError::Busy,
                ErrorCode::ConstraintViolation => StoreError::Constraint(err.to_string()),
                _ => StoreError::Sql(err),
            },
            _ => StoreError::Sql(err),
        }
    }
}
