use thiserror::Error;

/// Failures raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool error: {0}")]
    Pool(String),
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    /// The row changed after it was read; the caller should reload and retry.
    #[error("stale write: {0}")]
    StaleWrite(String),
}

impl StoreError {
    /// Splits diesel's unique-violation out so callers can turn it into a conflict.
    pub fn from_diesel(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::UniqueViolation(info.message().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunmateError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RunmateError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RunmateError::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        RunmateError::Unauthorized(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        RunmateError::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        RunmateError::Conflict(msg.into())
    }

    /// True for errors caused by the caller rather than the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, RunmateError::Store(_) | RunmateError::Internal(_))
    }
}

impl From<serde_json::Error> for RunmateError {
    fn from(err: serde_json::Error) -> Self {
        RunmateError::Internal(err.to_string())
    }
}

pub type Result<T, E = RunmateError> = std::result::Result<T, E>;
