//! Message contracts between a proxy and its parent pool.

use cinder_common::{ActionSpec, ActivationMessage};
use std::sync::Arc;

use crate::data::{ContainerData, ProxyState};

/// One activation routed to a proxy: the action to run and the message that
/// requested it.
#[derive(Debug, Clone)]
pub struct RunJob {
    pub action: Arc<ActionSpec>,
    pub message: ActivationMessage,
}

impl RunJob {
    pub fn new(action: Arc<ActionSpec>, message: ActivationMessage) -> Self {
        Self { action, message }
    }
}

/// Commands the pool sends to a proxy.
#[derive(Debug)]
pub enum ProxyCommand {
    /// Prewarm a container of the given runtime kind.
    Start { kind: String, memory_mb: u32 },
    /// Execute one activation.
    Run(RunJob),
    /// Give the container up. Deferred while activations are in flight.
    Remove,
}

/// Signals a proxy sends to its parent pool.
#[derive(Debug)]
pub enum PoolSignal {
    /// The proxy moved between states.
    Transition { from: ProxyState, to: ProxyState },
    /// The proxy can take more work; the payload describes what it holds.
    NeedWork(ContainerData),
    /// The container is gone (or was never obtained). Emitted exactly once
    /// per proxy.
    ContainerRemoved,
    /// A routing decision must be revisited. With `job` attached, that
    /// concrete run is being returned for re-dispatch; without, the proxy is
    /// removing itself and any run the pool just routed here will bounce.
    RescheduleJob { job: Option<RunJob> },
}
