//! Per-activation log collection.

use async_trait::async_trait;
use cinder_common::{ActionSpec, ActivationRecord, Identity, TransactionId};
use futures::StreamExt;
use thiserror::Error;

use crate::ops::ContainerOps;

/// The log lines collected for one activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationLogs(pub Vec<String>);

impl ActivationLogs {
    pub fn into_lines(self) -> Vec<String> {
        self.0
    }
}

/// Log collection failures. Both kinds are container-fatal; `Partial`
/// preserves whatever was read so it can still be persisted.
#[derive(Debug, Error)]
pub enum LogCollectError {
    #[error("log collection failed after {} lines: {reason}", logs.len())]
    Partial { logs: Vec<String>, reason: String },

    #[error("log collection failed: {0}")]
    Terminal(String),
}

/// Reads an activation's log segment out of a container.
#[async_trait]
pub trait LogCollector: Send + Sync {
    async fn collect(
        &self,
        txn: &TransactionId,
        user: &Identity,
        activation: &ActivationRecord,
        container: &dyn ContainerOps,
        action: &ActionSpec,
    ) -> Result<ActivationLogs, LogCollectError>;
}

/// Appended in place of lines dropped by the action's log limit.
const TRUNCATED_NOTICE: &str = "Logs were truncated because the action exceeded its log limit.";

/// Collector that drains the container's line stream up to the action's log
/// limit, stopping at the runtime's sentinel marker.
///
/// The sentinel value is runtime-specific and configured per collector; it
/// never reaches the persisted logs.
pub struct SentinelLogCollector {
    sentinel: String,
}

impl SentinelLogCollector {
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
        }
    }
}

#[async_trait]
impl LogCollector for SentinelLogCollector {
    async fn collect(
        &self,
        txn: &TransactionId,
        _user: &Identity,
        activation: &ActivationRecord,
        container: &dyn ContainerOps,
        action: &ActionSpec,
    ) -> Result<ActivationLogs, LogCollectError> {
        let limit = action.limits.log_limit_bytes;
        let mut stream = container.logs(limit, true);
        let mut lines = Vec::new();
        let mut collected_bytes = 0u64;
        let mut truncated = false;

        while let Some(item) = stream.next().await {
            let line = match item {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(
                        txn = %txn,
                        activation_id = %activation.activation_id,
                        error = %e,
                        "Log stream broke mid-collection"
                    );
                    if lines.is_empty() {
                        return Err(LogCollectError::Terminal(e.to_string()));
                    }
                    return Err(LogCollectError::Partial {
                        logs: lines,
                        reason: e.to_string(),
                    });
                }
            };

            if line == self.sentinel {
                break;
            }
            collected_bytes += line.len() as u64;
            if collected_bytes > limit {
                truncated = true;
                break;
            }
            lines.push(line);
        }

        if truncated {
            lines.push(TRUNCATED_NOTICE.to_string());
        }
        tracing::debug!(
            txn = %txn,
            activation_id = %activation.activation_id,
            lines = lines.len(),
            truncated,
            "Collected activation logs"
        );
        Ok(ActivationLogs(lines))
    }
}
