use serde::{Deserialize, Serialize};

use crate::status::RequestStatus;
use crate::types::Generation;

/// Internal errors raised by state transitions and store construction.
///
/// None of these cross the dispatch boundary: the store logs and drops them.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown slice: {0}")]
    UnknownSlice(String),

    #[error("Stale response discarded: generation {received} is not current ({current})")]
    StaleResponse {
        current: Generation,
        received: Generation,
    },

    #[error("Invalid transition: cannot {op} while {status}")]
    InvalidTransition {
        op: &'static str,
        status: RequestStatus,
    },

    #[error("Operation {op} is not supported by slice kind {kind}")]
    Unsupported { op: &'static str, kind: &'static str },
}

impl CoreError {
    /// Whether this error only signals an out-of-date completion.
    pub fn is_stale(&self) -> bool {
        matches!(self, CoreError::StaleResponse { .. })
    }
}

// ---------------------------------------------------------------------------
// RequestError
// ---------------------------------------------------------------------------

/// Classification of a user-visible request failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport or server-side transient failure. Retry by starting again.
    Network,
    /// The request was rejected. Retrying needs different input.
    Validation,
    /// The server-side job itself ended in failure.
    JobFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::JobFailed => "job_failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure detail captured into a slice's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct RequestError {
    pub kind: ErrorKind,
    pub message: String,
    pub code: Option<String>,
}

impl RequestError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn job_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::JobFailed, message)
    }

    /// Attach a machine-readable code (HTTP status, server error code).
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Only network failures are worth re-invoking unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Network
    }
}
