//! Container creation and process-wide cleanup.

use async_trait::async_trait;
use cinder_common::TransactionId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::OpsError;
use crate::ops::ContainerOps;

/// Prefix tagged onto every container this process creates.
///
/// The shutdown sweep recognizes its own leftovers by this prefix, so a
/// crashed predecessor's containers are reclaimed on the next start.
pub const CONTAINER_NAME_PREFIX: &str = "cinder";

/// A container name carrying the process prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerName(String);

impl ContainerName {
    /// Generate a fresh prefixed name.
    pub fn fresh() -> Self {
        Self(format!("{}-{}", CONTAINER_NAME_PREFIX, Uuid::new_v4().simple()))
    }

    /// Whether a raw name was produced by this process family.
    pub fn is_ours(name: &str) -> bool {
        name.starts_with(CONTAINER_NAME_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Creates containers and reclaims them on shutdown.
#[async_trait]
pub trait ContainerFactory: Send + Sync {
    /// Create a container for the given runtime kind with the given memory.
    async fn create(
        &self,
        txn: &TransactionId,
        kind: &str,
        memory_mb: u32,
    ) -> Result<Arc<dyn ContainerOps>, OpsError>;

    /// Destroy every live container this factory is responsible for,
    /// including prefix-tagged leftovers from earlier processes.
    async fn cleanup(&self) -> Result<(), OpsError>;
}

/// Run the factory's cleanup with a hard deadline.
///
/// Used from the process shutdown hook: destruction that does not finish
/// within `bound` (30 s by convention) is abandoned so the process can exit.
pub async fn shutdown(factory: &dyn ContainerFactory, bound: Duration) {
    tracing::info!(bound_secs = bound.as_secs(), "Destroying all containers");
    match tokio::time::timeout(bound, factory.cleanup()).await {
        Ok(Ok(())) => tracing::info!("Container cleanup complete"),
        Ok(Err(e)) => tracing::error!(error = %e, "Container cleanup failed"),
        Err(_) => tracing::error!(
            bound_secs = bound.as_secs(),
            "Container cleanup exceeded shutdown bound, abandoning"
        ),
    }
}
