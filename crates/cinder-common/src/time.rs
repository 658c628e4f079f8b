//! Wall-clock abstraction.

use chrono::{DateTime, Utc};

/// Source of wall-clock time.
///
/// Components that stamp intervals or `lastUsed` take a `Clock` so tests can
/// drive timing deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
