//! Per-entry state, mutated only by compare-and-set.

use futures::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::CacheError;

/// The future a coalesced read rides on. Resolves to the loaded value for
/// every rider, or to the shared failure.
pub(crate) type SharedValue<V> = Shared<BoxFuture<'static, Result<Arc<V>, CacheError>>>;

/// The future piggybacked invalidations ride on.
pub(crate) type SharedInvalidation = Shared<BoxFuture<'static, Result<(), CacheError>>>;

/// Lifecycle state of one cache entry. Absence from the map is the implicit
/// initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum EntryState {
    ReadInProgress = 0,
    WriteInProgress = 1,
    InvalidateInProgress = 2,
    InvalidateWhenDone = 3,
    Cached = 4,
}

impl EntryState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => EntryState::ReadInProgress,
            1 => EntryState::WriteInProgress,
            2 => EntryState::InvalidateInProgress,
            3 => EntryState::InvalidateWhenDone,
            _ => EntryState::Cached,
        }
    }
}

/// One cache entry: its state machine, the shared value future, and the
/// bookkeeping the evictor needs.
pub(crate) struct Entry<V> {
    /// Transaction that created the entry, for telemetry attribution.
    txn: String,
    state: AtomicU8,
    value: RwLock<Option<SharedValue<V>>>,
    invalidation: Mutex<Option<SharedInvalidation>>,
    /// Millis since the cache epoch of the last touch. Only meaningful while
    /// `Cached`.
    last_touched: AtomicU64,
}

impl<V> Entry<V> {
    pub fn new(txn: &str, state: EntryState, now_ms: u64) -> Self {
        Self {
            txn: txn.to_string(),
            state: AtomicU8::new(state as u8),
            value: RwLock::new(None),
            invalidation: Mutex::new(None),
            last_touched: AtomicU64::new(now_ms),
        }
    }

    pub fn txn(&self) -> &str {
        &self.txn
    }

    pub fn state(&self) -> EntryState {
        EntryState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Atomically move `from` to `to`. Returns false when the entry is no
    /// longer in `from`, in which case the caller re-reads the state.
    pub fn compare_and_set(&self, from: EntryState, to: EntryState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn install_value(&self, shared: SharedValue<V>) {
        *self.value.write().unwrap_or_else(|e| e.into_inner()) = Some(shared);
    }

    pub fn value(&self) -> Option<SharedValue<V>> {
        self.value
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn install_invalidation(&self, shared: SharedInvalidation) {
        *self
            .invalidation
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(shared);
    }

    pub fn invalidation(&self) -> Option<SharedInvalidation> {
        self.invalidation
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn touch(&self, now_ms: u64) {
        self.last_touched.store(now_ms, Ordering::Relaxed);
    }

    pub fn last_touched(&self) -> u64 {
        self.last_touched.load(Ordering::Relaxed)
    }
}
