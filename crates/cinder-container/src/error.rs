//! Error types for container operations.

use cinder_common::{ActivationResponse, Interval};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by [`ContainerOps`](crate::ContainerOps) implementations.
///
/// Apart from [`OpsError::Initialization`], every variant means the
/// container can no longer be trusted and must be destroyed. Failures of the
/// action itself are not errors: `run` reports them as a successful call
/// with a non-success [`ActivationResponse`].
#[derive(Debug, Error)]
pub enum OpsError {
    /// The initializer rejected the action.
    ///
    /// The embedded response distinguishes developer errors (broken code,
    /// bad entry point) from platform errors by its kind.
    #[error("initialization failed after {}ms: {}", interval.duration_ms(), response.kind)]
    Initialization {
        interval: Interval,
        response: ActivationResponse,
    },

    /// An operation exceeded its deadline.
    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },

    /// The container's endpoint could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The container answered with something the protocol does not allow.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// I/O error talking to the runtime.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OpsError {
    /// Whether this error carries a response distinguishing a developer
    /// mistake from a platform fault.
    pub fn initialization_response(&self) -> Option<&ActivationResponse> {
        match self {
            OpsError::Initialization { response, .. } => Some(response),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_initialization_error_display() {
        let err = OpsError::Initialization {
            interval: Interval::point(Utc::now()),
            response: ActivationResponse::developer_error("no main"),
        };
        let s = err.to_string();
        assert!(s.contains("initialization failed"));
        assert!(s.contains("developer error"));
    }

    #[test]
    fn test_timeout_display() {
        let err = OpsError::Timeout {
            what: "run",
            after: Duration::from_secs(60),
        };
        assert!(err.to_string().contains("run timed out"));
    }
}
