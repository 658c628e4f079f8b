//! Contracts for publishing activation results.

use async_trait::async_trait;
use cinder_common::{ActivationRecord, ControllerId, Identity, TransactionId};
use thiserror::Error;

/// What the controller is told about a finished activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgment {
    /// Completion only; the caller is not waiting on the result.
    Completion,
    /// Completion combined with the result, for blocking invocations.
    CombinedResult,
}

/// Errors from the publish path.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Publishes an activation's outcome back to the dispatching controller.
///
/// Invoked exactly once per accepted activation, whatever its outcome.
#[async_trait]
pub trait ActivationAcker: Send + Sync {
    async fn ack(
        &self,
        txn: &TransactionId,
        activation: &ActivationRecord,
        blocking: bool,
        controller: &ControllerId,
        user_id: &str,
        acknowledgment: Acknowledgment,
    ) -> Result<(), PublishError>;
}

/// Persists activation records.
///
/// May be skipped when the action collects no logs and the response fits
/// inline in the ack.
#[async_trait]
pub trait ActivationStore: Send + Sync {
    async fn store(
        &self,
        txn: &TransactionId,
        activation: &ActivationRecord,
        user: &Identity,
    ) -> Result<(), PublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_display() {
        assert_eq!(PublishError::Timeout.to_string(), "publish timed out");
        assert!(PublishError::Transport("broker gone".into())
            .to_string()
            .contains("broker gone"));
    }
}
