//! Per-namespace in-flight activation accounting.

use dashmap::DashMap;

/// A counter shared beyond this process.
///
/// The proxy only increments on admission, decrements on completion, and
/// reads for observability; how the value is replicated across nodes is the
/// implementation's business.
pub trait SharedCounter: Send + Sync {
    /// Increment and return the new value.
    fn increment(&self, namespace: &str) -> u64;
    /// Decrement (saturating) and return the new value.
    fn decrement(&self, namespace: &str) -> u64;
    fn get(&self, namespace: &str) -> u64;
}

/// Process-local counter implementation.
#[derive(Debug, Default)]
pub struct LocalCounter {
    counts: DashMap<String, u64>,
}

impl LocalCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedCounter for LocalCounter {
    fn increment(&self, namespace: &str) -> u64 {
        let mut entry = self.counts.entry(namespace.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    fn decrement(&self, namespace: &str) -> u64 {
        let mut entry = self.counts.entry(namespace.to_string()).or_insert(0);
        *entry = entry.saturating_sub(1);
        *entry
    }

    fn get(&self, namespace: &str) -> u64 {
        self.counts.get(namespace).map(|v| *v).unwrap_or(0)
    }
}
