//! Cache error types.

use std::sync::Arc;
use thiserror::Error;

/// Error produced by a loader, writer, or invalidator.
///
/// Shared behind an `Arc` because a coalesced read hands the same failure to
/// every rider.
pub type BackingError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by cache operations.
///
/// The cache introduces no failures of its own beyond the two internal-bug
/// kinds; everything else passes through from the backing operation.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// A read completed after its entry was claimed by an interleaved
    /// invalidation; the loaded value must not be trusted.
    #[error("cache read completed while the entry was being invalidated")]
    StaleRead,

    /// Two operations claimed ownership of one entry at the same time.
    #[error("concurrent cache operation on the same entry")]
    ConcurrentOperation,

    /// The backing operation failed.
    #[error("backing operation failed: {0}")]
    Backing(#[source] BackingError),
}
