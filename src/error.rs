//! Failure taxonomy for a single plan generation.
//!
//! The `Display` text of every variant is exactly what ends up in the
//! interaction state's error message, so it must never contain the credential.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{GENERIC_FAILURE_MESSAGE, MALFORMED_RESPONSE_MESSAGE, MISSING_INPUT_MESSAGE};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Goal or credential missing; raised before any network call.
    #[error("{}", MISSING_INPUT_MESSAGE)]
    Validation,

    /// The service answered with a failure; carries its reason or the generic fallback.
    #[error("{0}")]
    Upstream(String),

    /// A success response that did not contain a plan.
    #[error("{}", MALFORMED_RESPONSE_MESSAGE)]
    Protocol,

    /// The service could not be reached, or the bounded wait expired.
    #[error("{0}")]
    Transport(String),

    /// A request is already in flight for this session.
    #[error("A plan is already being generated.")]
    Busy,

    #[error("Plan generation was cancelled.")]
    Cancelled,
}

/// Coarse classification used in logs and the web API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Upstream,
    Protocol,
    Transport,
    Busy,
    Cancelled,
}

impl GenerationError {
    /// Upstream failure with the service's reason, falling back to the generic message.
    pub fn upstream(reason: Option<String>) -> Self {
        match reason {
            Some(reason) if !reason.trim().is_empty() => Self::Upstream(reason),
            _ => Self::Upstream(GENERIC_FAILURE_MESSAGE.to_string()),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation => ErrorKind::Validation,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Protocol => ErrorKind::Protocol,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Busy => ErrorKind::Busy,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether retrying the same invocation could succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Protocol)
    }
}
