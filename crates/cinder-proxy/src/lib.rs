//! # cinder-proxy
//!
//! The per-container lifecycle state machine.
//!
//! A [`ContainerProxy`] owns exactly one container from birth to death. The
//! parent pool creates one proxy per container slot, optionally prewarms it
//! with [`ProxyCommand::Start`], and routes activations to it with
//! [`ProxyCommand::Run`]. The proxy drives the container through the
//! [`ContainerOps`](cinder_container::ContainerOps) capability set, publishes
//! every activation exactly once through the [`ActivationAcker`] and
//! [`ActivationStore`] contracts, and reports its own availability and
//! demise back to the pool as [`PoolSignal`]s.
//!
//! The proxy is an event loop task: commands arrive on a bounded channel,
//! every container operation runs as a spawned task, and completions are
//! folded back in as events. The loop never blocks, so a proxy is always
//! responsive to `Remove` and timer events even while activations are in
//! flight.

mod config;
mod counter;
mod data;
mod protocol;
mod proxy;
mod publish;
mod timer;

pub use config::ProxyConfig;
pub use counter::{LocalCounter, SharedCounter};
pub use data::{ContainerData, ProxyState};
pub use protocol::{PoolSignal, ProxyCommand, RunJob};
pub use proxy::{ContainerProxy, ProxyDeps, ProxyError, ProxyHandle};
pub use publish::{Acknowledgment, ActivationAcker, ActivationStore, PublishError};
pub use timer::SingleShotTimer;
