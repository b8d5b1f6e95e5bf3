use thiserror::Error;
use uuid::Uuid;

use crate::models::Scope;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed {field} value: {value}")]
    Malformed { field: &'static str, value: String },
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("scope is locked by another commit")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("invalid scope: {0}")]
    InvalidScope(String),
    #[error("failed to read source data for teacher {teacher_id}: {source}")]
    TeacherSource {
        teacher_id: Uuid,
        #[source]
        source: SourceError,
    },
    #[error("failed to read source data: {0}")]
    Source(#[from] SourceError),
    #[error("commit for {scope} conflicts with another commit in progress")]
    Conflict { scope: Scope },
    #[error("commit for {scope} failed; previous results kept: {source}")]
    Store {
        scope: Scope,
        #[source]
        source: StoreError,
    },
    #[error("recalculation cancelled before commit")]
    Cancelled,
    #[error("cannot {action} while run is {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
}

impl ScoringError {
    /// Conflicts leave the scope untouched and can be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScoringError::Conflict { .. })
    }
}
