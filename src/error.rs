//! Typed errors returned by the evaluation core.

use thiserror::Error;

/// Errors surfaced to collaborators of the monitor.
///
/// None of these are fatal: every failure leaves the core state untouched
/// and is reported back to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SentinelError {
    /// The request was malformed (unknown metric, non-finite value, blank
    /// approver, unknown scenario, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// The request is valid but contradicts the current state.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl SentinelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        SentinelError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        SentinelError::Conflict(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        SentinelError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
