use thiserror::Error;

use crate::services::StoreError;

/// Errors surfaced by the matching and chat core
#[derive(Debug, Error)]
pub enum CoreError {
    /// Rejected before any remote call
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Duplicate swipe or canonical match; callers treat it as a no-op
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The match or profile was deleted underneath the caller
    #[error("No longer exists: {0}")]
    ReferenceGone(String),

    #[error("Failed to send message: {0}")]
    SendFailed(#[source] StoreError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Remote call failed; writes are not retried automatically
    #[error("Store unavailable: {0}")]
    Transient(#[source] StoreError),
}

impl CoreError {
    /// Conflicts are idempotent outcomes, not failures
    pub fn is_benign(&self) -> bool {
        matches!(self, CoreError::Conflict(_))
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => CoreError::Conflict(msg),
            StoreError::NotFound(msg) => CoreError::ReferenceGone(msg),
            other => CoreError::Transient(other),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
