//! The multi-reader/single-writer cache.

use cinder_common::TransactionId;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use futures::future::FutureExt;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::entry::{Entry, EntryState, SharedInvalidation, SharedValue};
use crate::error::{BackingError, CacheError};
use crate::stats::CacheStats;

/// Sizing and expiry knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries kept. Exceeding it evicts the least
    /// recently touched `Cached` entry.
    pub capacity: usize,
    /// Time after the last touch at which a `Cached` entry expires.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// A cache guarding backing-store reads, writes, and invalidations for one
/// kind of metadata entity.
///
/// Shared freely across tasks; every entry-state change is an atomic
/// compare-and-set, so no operation ever blocks another beyond awaiting a
/// shared backing future.
pub struct MrswCache<K, V> {
    entries: Arc<DashMap<K, Arc<Entry<V>>>>,
    capacity: usize,
    ttl_ms: u64,
    epoch: Instant,
    stats: Arc<CacheStats>,
}

impl<K, V> MrswCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            capacity: config.capacity.max(1),
            ttl_ms: config.ttl.as_millis() as u64,
            epoch: Instant::now(),
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Current number of entries, including in-progress ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Look up `key`, starting a backing read via `loader` on a miss.
    ///
    /// - `Cached` entry: returns the value (hit).
    /// - Read in progress: rides the pending read (coalesced hit).
    /// - Write or invalidation in progress: bypasses the cache and loads
    ///   directly, without promoting the result (read-around).
    pub async fn lookup<F, Fut>(
        &self,
        txn: &TransactionId,
        key: K,
        loader: F,
    ) -> Result<Arc<V>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, BackingError>> + Send + 'static,
    {
        let mut loader = Some(loader);
        loop {
            let existing = self.entries.get(&key).map(|r| r.value().clone());
            if let Some(entry) = existing {
                match entry.state() {
                    EntryState::Cached => {
                        if self.expired(&entry) {
                            self.expire(&key, &entry);
                            continue;
                        }
                        entry.touch(self.now_ms());
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(txn = %txn, key = %key, entry_txn = entry.txn(), "Cache hit");
                        match entry.value() {
                            Some(shared) => return shared.await,
                            None => return Err(CacheError::ConcurrentOperation),
                        }
                    }
                    EntryState::ReadInProgress => {
                        self.stats.coalesced_hits.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(
                            txn = %txn,
                            key = %key,
                            entry_txn = entry.txn(),
                            "Coalescing onto in-progress cache read"
                        );
                        match entry.value() {
                            Some(shared) => return shared.await,
                            None => return Err(CacheError::ConcurrentOperation),
                        }
                    }
                    _ => {
                        // Somebody owns the entry; read around it.
                        self.stats.read_arounds.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(txn = %txn, key = %key, "Cache busy, reading around");
                        let make = match loader.take() {
                            Some(make) => make,
                            None => return Err(CacheError::ConcurrentOperation),
                        };
                        let value = make().await.map_err(CacheError::Backing)?;
                        return Ok(Arc::new(value));
                    }
                }
            }

            // Miss: try to claim the key with a fresh read.
            let installed = match self.entries.entry(key.clone()) {
                MapEntry::Occupied(_) => None,
                MapEntry::Vacant(slot) => {
                    let make = match loader.take() {
                        Some(make) => make,
                        None => return Err(CacheError::ConcurrentOperation),
                    };
                    let entry = Arc::new(Entry::new(
                        txn.id(),
                        EntryState::ReadInProgress,
                        self.now_ms(),
                    ));
                    let shared: SharedValue<V> = drive_read(
                        Arc::clone(&self.entries),
                        key.clone(),
                        Arc::clone(&entry),
                        make(),
                        Arc::clone(&self.stats),
                        self.now_ms(),
                    )
                    .boxed()
                    .shared();
                    entry.install_value(shared.clone());
                    slot.insert(entry);
                    Some(shared)
                }
            };

            match installed {
                Some(shared) => {
                    self.stats.misses.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(txn = %txn, key = %key, "Cache miss, reading through");
                    self.enforce_capacity();
                    return shared.await;
                }
                // Lost the insertion race; re-examine the winner's entry.
                None => continue,
            }
        }
    }

    /// Write `value` through the cache.
    ///
    /// Installs a `WriteInProgress` entry, runs `writer` against the backing
    /// store, and promotes to `Cached` on success — unless an invalidation
    /// was scheduled meanwhile, in which case the entry is evicted. Writer
    /// failure evicts.
    pub async fn update<F, Fut>(
        &self,
        txn: &TransactionId,
        key: K,
        value: V,
        writer: F,
    ) -> Result<Arc<V>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), BackingError>> + Send,
    {
        let value = Arc::new(value);
        let entry = self.claim_for_write(txn, &key, Arc::clone(&value))?;

        match writer().await {
            Ok(()) => {
                if entry.compare_and_set(EntryState::WriteInProgress, EntryState::Cached) {
                    entry.touch(self.now_ms());
                    tracing::debug!(txn = %txn, key = %key, "Cache write promoted");
                    self.enforce_capacity();
                    Ok(value)
                } else if entry.state() == EntryState::InvalidateWhenDone {
                    // An invalidation overtook the write; the store write
                    // stands but the entry must go.
                    remove_matching(&self.entries, &key, &entry);
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(txn = %txn, key = %key, "Cache write evicted by invalidation");
                    Ok(value)
                } else {
                    remove_matching(&self.entries, &key, &entry);
                    Err(CacheError::ConcurrentOperation)
                }
            }
            Err(e) => {
                remove_matching(&self.entries, &key, &entry);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(txn = %txn, key = %key, error = %e, "Cache write failed, evicting");
                Err(CacheError::Backing(e))
            }
        }
    }

    /// Invalidate `key`.
    ///
    /// A `Cached` entry is claimed, the backing `invalidator` runs, and the
    /// entry is removed. When a read or write owns the entry it is marked
    /// `InvalidateWhenDone` so the owner evicts on completion. An already
    /// scheduled invalidation is piggybacked: the backing invalidator runs
    /// once and every caller awaits the same outcome.
    pub async fn invalidate<F, Fut>(
        &self,
        txn: &TransactionId,
        key: &K,
        invalidator: F,
    ) -> Result<(), CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), BackingError>> + Send + 'static,
    {
        let mut invalidator = Some(invalidator);
        loop {
            let existing = self.entries.get(key).map(|r| r.value().clone());
            let entry = match existing {
                Some(entry) => entry,
                None => {
                    // Nothing cached; the backing store may still hold it.
                    let make = match invalidator.take() {
                        Some(make) => make,
                        None => return Err(CacheError::ConcurrentOperation),
                    };
                    tracing::debug!(txn = %txn, key = %key, "Invalidating uncached key");
                    return make().await.map_err(CacheError::Backing);
                }
            };

            match entry.state() {
                EntryState::Cached => {
                    if !entry.compare_and_set(EntryState::Cached, EntryState::InvalidateInProgress)
                    {
                        continue;
                    }
                    let make = match invalidator.take() {
                        Some(make) => make,
                        None => return Err(CacheError::ConcurrentOperation),
                    };
                    let entries = Arc::clone(&self.entries);
                    let stats = Arc::clone(&self.stats);
                    let owned_key = key.clone();
                    let owned_entry = Arc::clone(&entry);
                    let fut = make();
                    let shared: SharedInvalidation = async move {
                        let result = fut.await.map_err(CacheError::Backing);
                        remove_matching(&entries, &owned_key, &owned_entry);
                        stats.evictions.fetch_add(1, Ordering::Relaxed);
                        result
                    }
                    .boxed()
                    .shared();
                    entry.install_invalidation(shared.clone());
                    tracing::debug!(txn = %txn, key = %key, "Invalidating cached entry");
                    return shared.await;
                }
                EntryState::ReadInProgress | EntryState::WriteInProgress => {
                    let from = entry.state();
                    if !entry.compare_and_set(from, EntryState::InvalidateWhenDone) {
                        continue;
                    }
                    let make = match invalidator.take() {
                        Some(make) => make,
                        None => return Err(CacheError::ConcurrentOperation),
                    };
                    // The in-progress owner evicts the entry when it
                    // completes; only the backing store is touched here.
                    let fut = make();
                    let shared: SharedInvalidation =
                        async move { fut.await.map_err(CacheError::Backing) }
                            .boxed()
                            .shared();
                    entry.install_invalidation(shared.clone());
                    tracing::debug!(
                        txn = %txn,
                        key = %key,
                        "Deferred invalidation behind in-progress operation"
                    );
                    return shared.await;
                }
                EntryState::InvalidateInProgress | EntryState::InvalidateWhenDone => {
                    tracing::debug!(txn = %txn, key = %key, "Piggybacking on scheduled invalidation");
                    match entry.invalidation() {
                        Some(shared) => return shared.await,
                        // Claimed by the expiry sweep, which has no backing
                        // work to wait for.
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    fn claim_for_write(
        &self,
        txn: &TransactionId,
        key: &K,
        value: Arc<V>,
    ) -> Result<Arc<Entry<V>>, CacheError> {
        loop {
            let existing = self.entries.get(key).map(|r| r.value().clone());
            if let Some(entry) = existing {
                let state = entry.state();
                match state {
                    EntryState::Cached | EntryState::ReadInProgress => {
                        if entry.compare_and_set(state, EntryState::WriteInProgress) {
                            entry.install_value(ready_value(Arc::clone(&value)));
                            return Ok(entry);
                        }
                        continue;
                    }
                    _ => {
                        tracing::warn!(
                            txn = %txn,
                            key = %key,
                            state = ?state,
                            "Rejecting concurrent cache write"
                        );
                        return Err(CacheError::ConcurrentOperation);
                    }
                }
            }

            let installed = match self.entries.entry(key.clone()) {
                MapEntry::Occupied(_) => None,
                MapEntry::Vacant(slot) => {
                    let entry = Arc::new(Entry::new(
                        txn.id(),
                        EntryState::WriteInProgress,
                        self.now_ms(),
                    ));
                    entry.install_value(ready_value(Arc::clone(&value)));
                    slot.insert(Arc::clone(&entry));
                    Some(entry)
                }
            };
            match installed {
                Some(entry) => return Ok(entry),
                None => continue,
            }
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn expired(&self, entry: &Arc<Entry<V>>) -> bool {
        self.now_ms().saturating_sub(entry.last_touched()) > self.ttl_ms
    }

    /// Expire a `Cached` entry. Entries mid-operation are left alone.
    fn expire(&self, key: &K, entry: &Arc<Entry<V>>) {
        if entry.compare_and_set(EntryState::Cached, EntryState::InvalidateInProgress) {
            remove_matching(&self.entries, key, entry);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Expired cache entry");
        }
    }

    /// Evict least-recently-touched `Cached` entries until within capacity.
    fn enforce_capacity(&self) {
        let mut attempts = 0;
        while self.entries.len() > self.capacity && attempts < 64 {
            attempts += 1;
            let victim = self
                .entries
                .iter()
                .filter(|r| r.value().state() == EntryState::Cached)
                .min_by_key(|r| r.value().last_touched())
                .map(|r| (r.key().clone(), Arc::clone(r.value())));
            match victim {
                Some((key, entry)) => {
                    if entry
                        .compare_and_set(EntryState::Cached, EntryState::InvalidateInProgress)
                    {
                        remove_matching(&self.entries, &key, &entry);
                        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(key = %key, "Evicted cache entry for capacity");
                    }
                }
                None => break,
            }
        }
    }
}

/// Build the resolved value future a write installs.
fn ready_value<V: Send + Sync + 'static>(value: Arc<V>) -> SharedValue<V> {
    futures::future::ready(Ok(value)).boxed().shared()
}

/// Remove `key` only while it still maps to `entry`.
fn remove_matching<K, V>(entries: &DashMap<K, Arc<Entry<V>>>, key: &K, entry: &Arc<Entry<V>>)
where
    K: Eq + Hash,
{
    entries.remove_if(key, |_, current| Arc::ptr_eq(current, entry));
}

/// Drive one backing read and fold its completion back into the entry state.
async fn drive_read<K, V, Fut>(
    entries: Arc<DashMap<K, Arc<Entry<V>>>>,
    key: K,
    entry: Arc<Entry<V>>,
    fut: Fut,
    stats: Arc<CacheStats>,
    started_ms: u64,
) -> Result<Arc<V>, CacheError>
where
    K: Eq + Hash + fmt::Display,
    Fut: Future<Output = Result<V, BackingError>>,
{
    match fut.await {
        Ok(value) => {
            let value = Arc::new(value);
            if entry.compare_and_set(EntryState::ReadInProgress, EntryState::Cached) {
                entry.touch(started_ms);
                return Ok(value);
            }
            match entry.state() {
                EntryState::InvalidateWhenDone => {
                    // The invalidation wins the entry, the reader keeps the
                    // value it loaded.
                    remove_matching(&entries, &key, &entry);
                    stats.evictions.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key, "Read overtaken by invalidation, evicting");
                    Ok(value)
                }
                // A write overrode the read; its value owns the entry now.
                EntryState::WriteInProgress | EntryState::Cached => Ok(value),
                _ => {
                    remove_matching(&entries, &key, &entry);
                    tracing::warn!(key = %key, "Stale cache read detected");
                    Err(CacheError::StaleRead)
                }
            }
        }
        Err(e) => {
            remove_matching(&entries, &key, &entry);
            Err(CacheError::Backing(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn cache() -> MrswCache<String, u32> {
        MrswCache::new(CacheConfig::default())
    }

    fn small_cache(capacity: usize, ttl: Duration) -> MrswCache<String, u32> {
        MrswCache::new(CacheConfig { capacity, ttl })
    }

    fn txn() -> TransactionId {
        TransactionId::new()
    }

    fn boom() -> BackingError {
        Arc::new(std::io::Error::other("backing store down"))
    }

    #[tokio::test]
    async fn test_round_trip() {
        let cache = cache();
        let t = txn();
        let written = cache
            .update(&t, "k".to_string(), 7, || async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(*written, 7);

        let read = cache
            .lookup(&t, "k".to_string(), || async { Err(boom()) })
            .await
            .unwrap();
        assert_eq!(*read, 7);
        assert_eq!(cache.stats().hits(), 1);
    }

    #[tokio::test]
    async fn test_miss_loads_once_then_hits() {
        let cache = Arc::new(cache());
        let loads = Arc::new(AtomicU32::new(0));
        let t = txn();

        for _ in 0..3 {
            let loads = Arc::clone(&loads);
            let value = cache
                .lookup(&t, "k".to_string(), move || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await
                .unwrap();
            assert_eq!(*value, 42);
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.stats().hits(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_reads_coalesce() {
        let cache = Arc::new(cache());
        let loads = Arc::new(AtomicU32::new(0));

        let first = {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            tokio::spawn(async move {
                cache
                    .lookup(&txn(), "k".to_string(), move || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(11)
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = cache
            .lookup(&txn(), "k".to_string(), || async { Err(boom()) })
            .await
            .unwrap();

        assert_eq!(*second, 11);
        assert_eq!(*first.await.unwrap().unwrap(), 11);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().coalesced_hits(), 1);
    }

    #[tokio::test]
    async fn test_read_around_during_write() {
        let cache = Arc::new(cache());

        let write = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .update(&txn(), "k".to_string(), 9, || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(())
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let loads = Arc::new(AtomicU32::new(0));
        let loads_in = Arc::clone(&loads);
        let around = cache
            .lookup(&txn(), "k".to_string(), move || async move {
                loads_in.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await
            .unwrap();

        // Bypassed the cache, did not pollute the pending write.
        assert_eq!(*around, 7);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().read_arounds(), 1);

        write.await.unwrap().unwrap();
        let after = cache
            .lookup(&txn(), "k".to_string(), || async { Err(boom()) })
            .await
            .unwrap();
        assert_eq!(*after, 9);
    }

    #[tokio::test]
    async fn test_invalidation_during_read_evicts_but_resolves_reader() {
        let cache = Arc::new(cache());
        let loads = Arc::new(AtomicU32::new(0));

        let reader = {
            let cache = Arc::clone(&cache);
            let loads = Arc::clone(&loads);
            tokio::spawn(async move {
                cache
                    .lookup(&txn(), "k".to_string(), move || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(5)
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cache
            .invalidate(&txn(), &"k".to_string(), || async { Ok(()) })
            .await
            .unwrap();

        // The in-flight reader still resolves with the loaded value...
        assert_eq!(*reader.await.unwrap().unwrap(), 5);
        // ...but the entry was evicted, so the next lookup re-reads.
        let loads_in = Arc::clone(&loads);
        let reread = cache
            .lookup(&txn(), "k".to_string(), move || async move {
                loads_in.fetch_add(1, Ordering::SeqCst);
                Ok(6)
            })
            .await
            .unwrap();
        assert_eq!(*reread, 6);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_cached_entry() {
        let cache = cache();
        let t = txn();
        cache
            .update(&t, "k".to_string(), 3, || async { Ok(()) })
            .await
            .unwrap();

        let invalidations = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&invalidations);
        cache
            .invalidate(&t, &"k".to_string(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(invalidations.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());

        let reloaded = cache
            .lookup(&t, "k".to_string(), || async { Ok(8) })
            .await
            .unwrap();
        assert_eq!(*reloaded, 8);
    }

    #[tokio::test]
    async fn test_scheduled_invalidation_is_piggybacked() {
        let cache = Arc::new(cache());
        let t = txn();
        cache
            .update(&t, "k".to_string(), 3, || async { Ok(()) })
            .await
            .unwrap();

        let first = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .invalidate(&txn(), &"k".to_string(), || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(())
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let second_runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&second_runs);
        cache
            .invalidate(&t, &"k".to_string(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();

        first.await.unwrap().unwrap();
        // The second caller rode the scheduled invalidation.
        assert_eq!(second_runs.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_write_overrides_in_progress_read() {
        let cache = Arc::new(cache());

        let reader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .lookup(&txn(), "k".to_string(), || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(1)
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        cache
            .update(&txn(), "k".to_string(), 2, || async { Ok(()) })
            .await
            .unwrap();

        // The reader keeps the value it loaded; the cache keeps the write.
        assert_eq!(*reader.await.unwrap().unwrap(), 1);
        let after = cache
            .lookup(&txn(), "k".to_string(), || async { Err(boom()) })
            .await
            .unwrap();
        assert_eq!(*after, 2);
    }

    #[tokio::test]
    async fn test_failed_write_evicts() {
        let cache = cache();
        let t = txn();
        let result = cache
            .update(&t, "k".to_string(), 5, || async { Err(boom()) })
            .await;
        assert!(matches!(result, Err(CacheError::Backing(_))));
        assert!(cache.is_empty());

        let reloaded = cache
            .lookup(&t, "k".to_string(), || async { Ok(6) })
            .await
            .unwrap();
        assert_eq!(*reloaded, 6);
    }

    #[tokio::test]
    async fn test_failed_read_is_not_cached() {
        let cache = cache();
        let t = txn();
        let result = cache
            .lookup(&t, "k".to_string(), || async { Err(boom()) })
            .await;
        assert!(matches!(result, Err(CacheError::Backing(_))));
        assert!(cache.is_empty());

        let recovered = cache
            .lookup(&t, "k".to_string(), || async { Ok(4) })
            .await
            .unwrap();
        assert_eq!(*recovered, 4);
    }

    #[tokio::test]
    async fn test_ttl_expires_cached_entries() {
        let cache = small_cache(8, Duration::from_millis(20));
        let t = txn();
        cache
            .update(&t, "k".to_string(), 1, || async { Ok(()) })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        let loads = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&loads);
        let value = cache
            .lookup(&t, "k".to_string(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
            .await
            .unwrap();

        assert_eq!(*value, 2);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(cache.stats().evictions() >= 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_touched() {
        let cache = small_cache(2, Duration::from_secs(300));
        let t = txn();
        for (key, value) in [("a", 1), ("b", 2), ("c", 3)] {
            cache
                .update(&t, key.to_string(), value, || async { Ok(()) })
                .await
                .unwrap();
        }
        assert!(cache.len() <= 2);
        assert!(cache.stats().evictions() >= 1);
    }

    #[tokio::test]
    async fn test_invalidate_uncached_key_touches_backing() {
        let cache = cache();
        let invalidations = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&invalidations);
        cache
            .invalidate(&txn(), &"missing".to_string(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(invalidations.load(Ordering::SeqCst), 1);
    }
}
