//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.
//!
//! These are *infrastructure* errors: conditions that abort an operation
//! before or outside job execution. Expected failure modes of a running job
//! (collaborator missing, entity missing, unsupported operation) are data,
//! not errors, and travel as [`crate::reply::Reply`] variants.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the Fedra platform core.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (map to wire code INVALID_ARGUMENT).
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found (map to wire code NOT_FOUND).
    #[error("not found: {0}")]
    NotFound(String),

    /// No registered factory claims a job type (map to UNKNOWN_JOB_TYPE).
    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    /// Executor at capacity or shutting down (map to UNAVAILABLE).
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Operation not valid in the current lifecycle state (map to
    /// FAILED_PRECONDITION).
    #[error("state transition error: {0}")]
    StateTransition(String),

    /// Internal errors (map to INTERNAL).
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Convert to the access-protocol error code carried in error frames.
    pub fn to_wire_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "INVALID_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::UnknownJobType(_) => "UNKNOWN_JOB_TYPE",
            Error::Unavailable(_) => "UNAVAILABLE",
            Error::StateTransition(_) => "FAILED_PRECONDITION",
            Error::Internal(_) => "INTERNAL",
            Error::Serialization(_) => "INVALID_ARGUMENT",
            Error::Io(_) => "INTERNAL",
        }
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unknown_job_type(msg: impl Into<String>) -> Self {
        Self::UnknownJobType(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn state_transition(msg: impl Into<String>) -> Self {
        Self::StateTransition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
