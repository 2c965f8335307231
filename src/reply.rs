//! Job outcome type.
//!
//! Every job finishes with a [`Reply`] describing what happened. Expected
//! failure modes (missing collaborator, missing entity, unsupported request)
//! are ordinary variants here, not [`crate::types::Error`] values: callers
//! inspect the outcome, they do not unwind through it.
//!
//! Replies are serialized across the access transport, so the wire shape is
//! part of the contract: an internally tagged object with a `kind` field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a single job execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    /// The job did what it was asked. May carry a result payload.
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },

    /// The job produced a list of results.
    Collection { items: Vec<Value> },

    /// The work itself failed in an anticipated way.
    Failure { message: String },

    /// Execution blew up: a panic or an unanticipated error.
    Exception { error: String },

    /// The job does not support the requested operation.
    Unsupported,

    /// A collaborating service the job needed was not available.
    ServiceUnavailable,

    /// The entity the job was asked to operate on does not exist.
    NotFound,
}

impl Reply {
    /// Successful completion without a payload.
    pub fn success() -> Self {
        Reply::Success { payload: None }
    }

    /// Successful completion carrying a result payload.
    pub fn success_with(payload: Value) -> Self {
        Reply::Success {
            payload: Some(payload),
        }
    }

    /// Successful completion carrying a list of results.
    pub fn collection(items: Vec<Value>) -> Self {
        Reply::Collection { items }
    }

    /// Anticipated failure with a human-readable message.
    pub fn failure(message: impl Into<String>) -> Self {
        Reply::Failure {
            message: message.into(),
        }
    }

    /// Unanticipated failure (panic or internal error).
    pub fn exception(error: impl Into<String>) -> Self {
        Reply::Exception {
            error: error.into(),
        }
    }

    /// True only for [`Reply::Success`] and [`Reply::Collection`].
    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Success { .. } | Reply::Collection { .. })
    }

    /// Stable lowercase label for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Success { .. } => "success",
            Reply::Collection { .. } => "collection",
            Reply::Failure { .. } => "failure",
            Reply::Exception { .. } => "exception",
            Reply::Unsupported => "unsupported",
            Reply::ServiceUnavailable => "service_unavailable",
            Reply::NotFound => "not_found",
        }
    }
}
