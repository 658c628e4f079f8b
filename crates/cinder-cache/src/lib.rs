//! # cinder-cache
//!
//! A multi-reader/single-writer cache guarding backing-store reads and
//! writes for metadata entities.
//!
//! Every entry carries a small state machine mutated only by atomic
//! compare-and-set: `ReadInProgress`, `WriteInProgress`,
//! `InvalidateInProgress`, `InvalidateWhenDone`, `Cached`. Absence from the
//! map is the implicit initial state. The invariants:
//!
//! - at most one write or invalidation owns a key at any time;
//! - readers of the same key coalesce onto one backing read;
//! - readers that find a write or invalidation in progress read around the
//!   cache without promoting the result;
//! - `InvalidateWhenDone` overrides a successful read or write completion:
//!   the entry is evicted, never promoted.
//!
//! Eviction is bounded-size LRU with a TTL over `Cached` entries only;
//! entries mid-operation are never expired out from under their owner.

mod cache;
mod entry;
mod error;
mod stats;

pub use cache::{CacheConfig, MrswCache};
pub use error::{BackingError, CacheError};
pub use stats::CacheStats;
