//! Tracing subscriber setup.
//!
//! Log verbosity is controlled through `RUST_LOG`, e.g.
//! `RUST_LOG=cinder_proxy=debug,info`.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
