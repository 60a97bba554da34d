//! Store error types.

use pixelgrade_core::model::SubmissionStatus;
use thiserror::Error;

/// Errors raised by challenge and submission stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No submission with this id exists.
    #[error("submission not found: {0}")]
    SubmissionNotFound(String),

    /// The id cannot be used as a storage key.
    #[error("invalid id: {0:?}")]
    InvalidId(String),

    /// The lifecycle does not allow this status change.
    #[error("submission {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: SubmissionStatus,
        to: SubmissionStatus,
    },

    /// A submission with this id is already stored.
    #[error("submission already exists: {0}")]
    Duplicate(String),

    /// Authentication with the remote store failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The remote store returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// A stored record could not be read or written.
    #[error("corrupt record {path}: {message}")]
    Corrupt { path: String, message: String },

    /// Store state lock was poisoned by a panicking thread.
    #[error("store lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reject ids that would escape a storage namespace.
pub(crate) fn check_id(id: &str) -> Result<(), StoreError> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\'])
        || id.chars().any(char::is_control);
    if bad {
        Err(StoreError::InvalidId(id.to_string()))
    } else {
        Ok(())
    }
}

/// Check a lifecycle step.
pub(crate) fn check_transition(
    id: &str,
    from: SubmissionStatus,
    to: SubmissionStatus,
) -> Result<(), StoreError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            id: id.to_string(),
            from,
            to,
        })
    }
}
