//! Single-shot state timers.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A re-armable single-shot timer that posts a message on expiry.
///
/// Every arm (and every cancel) bumps a generation counter which is baked
/// into the posted message, so a firing that raced a state change can be
/// recognized as stale and dropped.
pub struct SingleShotTimer {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl SingleShotTimer {
    pub fn new() -> Self {
        Self {
            generation: 0,
            handle: None,
        }
    }

    /// Arm the timer, cancelling any previous arming.
    ///
    /// After `after` elapses, `make(generation)` is sent on `tx`.
    pub fn arm<T, F>(&mut self, after: Duration, tx: mpsc::Sender<T>, make: F)
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(make(generation)).await;
        }));
    }

    /// Cancel any pending firing. Firings already in the channel become
    /// stale.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation += 1;
    }

    /// Whether a firing with this generation is still meaningful.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }
}

impl Default for SingleShotTimer {
    fn default() -> Self {
        Self::new()
    }
}
