//! The operation set the proxy drives on one container.

use async_trait::async_trait;
use cinder_common::{ActivationResponse, Interval};
use futures::stream::BoxStream;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::OpsError;

/// Unique identifier of one container instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(Uuid);

impl ContainerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ContainerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A lazy stream of log lines read from the container.
pub type LogStream = BoxStream<'static, Result<String, OpsError>>;

/// Everything the proxy can do with one container.
///
/// One container is owned by exactly one proxy; no other component invokes
/// these operations. All operations are asynchronous and fail with a typed
/// [`OpsError`] on timeout, transport failure, or protocol violation.
#[async_trait]
pub trait ContainerOps: Send + Sync {
    /// This container's identity.
    fn id(&self) -> ContainerId;

    /// Hand the action code to the runtime.
    ///
    /// Returns the initialize interval on success. Rejections carry the
    /// interval and a response classifying the failure as a developer or
    /// platform error.
    async fn initialize(
        &self,
        payload: Value,
        timeout: Duration,
        concurrency: u32,
    ) -> Result<Interval, OpsError>;

    /// Run one activation.
    ///
    /// `params` are the main parameters, `env` the environment record built
    /// by [`RunEnv`](crate::RunEnv). The container enforces `timeout`.
    /// Action-level failures are reported in the returned response, not as
    /// errors; an `Err` from this method is container-fatal.
    async fn run(
        &self,
        params: Value,
        env: Value,
        timeout: Duration,
        concurrency: u32,
    ) -> Result<(Interval, ActivationResponse), OpsError>;

    /// Stream log lines, up to `limit_bytes`.
    ///
    /// When `wait_for_sentinel` is set the stream ends at the runtime's
    /// per-activation sentinel marker; otherwise it ends when the source is
    /// drained.
    fn logs(&self, limit_bytes: u64, wait_for_sentinel: bool) -> LogStream;

    /// Suspend the container. Any kept HTTP connection must be closed.
    async fn suspend(&self) -> Result<(), OpsError>;

    /// Resume a suspended container. The connection to the runtime must be
    /// re-established before this returns.
    async fn resume(&self) -> Result<(), OpsError>;

    /// Destroy the container and reclaim its resources. Idempotent.
    async fn destroy(&self) -> Result<(), OpsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_unique() {
        assert_ne!(ContainerId::new(), ContainerId::new());
    }

    #[test]
    fn test_container_id_display() {
        let id = ContainerId::new();
        assert_eq!(id.to_string().len(), 36);
    }
}
