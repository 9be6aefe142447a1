use std::path::PathBuf;

use jmt_core::{ParseStatusError, PayloadError};
use sqlx::error::ErrorKind;
use thiserror::Error;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job match already stored for ({job_url}, {search_term}, {cv_key})")]
    DuplicateEntry {
        job_url: String,
        search_term: String,
        cv_key: String,
    },
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("store busy: {0}")]
    StoreBusy(String),
    #[error("invalid url `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },
    #[error(transparent)]
    InvalidStatus(#[from] ParseStatusError),
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),
    #[error("unknown job match {0}")]
    UnknownJobMatch(i64),
    #[error("{0} not found")]
    NotFound(String),
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("schema not initialized; run `jmt-cli init` first")]
    SchemaMissing,
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    /// Only lock contention is worth retrying; everything else is deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::StoreBusy(_))
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateEntry { .. })
    }

    pub(crate) fn invalid_url(input: &str, reason: impl Into<String>) -> Self {
        StoreError::InvalidUrl {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let classified = match &err {
            sqlx::Error::PoolTimedOut => Some(StoreError::StoreBusy(
                "timed out waiting for a connection".to_string(),
            )),
            sqlx::Error::Database(db) if is_lock_contention(db.code().as_deref()) => {
                Some(StoreError::StoreBusy(db.message().to_string()))
            }
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    Some(StoreError::ConstraintViolation(db.message().to_string()))
                }
                _ => None,
            },
            _ => None,
        };
        classified.unwrap_or(StoreError::Database(err))
    }
}

// SQLite reports extended result codes; the primary code lives in the low byte.
fn is_lock_contention(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}
