//! Proxy states and the container data attached to them.

use chrono::{DateTime, Utc};
use cinder_common::ActionSpec;
use cinder_container::ContainerOps;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of one container proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// Fresh proxy, no container yet.
    Uninitialized,
    /// Prewarm container creation in flight.
    Starting,
    /// Prewarmed, never used.
    Started,
    /// One or more activations in flight.
    Running,
    /// Warm and idle, not paused.
    Ready,
    /// Suspend in flight.
    Pausing,
    /// Suspended; must be resumed before any run.
    Paused,
    /// Destroy scheduled or in flight.
    Removing,
}

impl fmt::Display for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyState::Uninitialized => write!(f, "uninitialized"),
            ProxyState::Starting => write!(f, "starting"),
            ProxyState::Started => write!(f, "started"),
            ProxyState::Running => write!(f, "running"),
            ProxyState::Ready => write!(f, "ready"),
            ProxyState::Pausing => write!(f, "pausing"),
            ProxyState::Paused => write!(f, "paused"),
            ProxyState::Removing => write!(f, "removing"),
        }
    }
}

/// What the proxy currently holds, attached to its state.
///
/// The in-flight activation count lives here, on the variants that can carry
/// work; it gates suspension and concurrency admission.
#[derive(Clone)]
pub enum ContainerData {
    /// Nothing yet.
    None,
    /// Memory reserved, container not created.
    Resources { memory_mb: u32 },
    /// Container exists, not bound to any action.
    PreWarmed {
        ops: Arc<dyn ContainerOps>,
        kind: String,
        memory_mb: u32,
    },
    /// Cold start in flight, container not yet obtained.
    WarmingCold {
        action: Arc<ActionSpec>,
        invocation_namespace: String,
        last_used: DateTime<Utc>,
        active: u32,
    },
    /// Container being initialized for a specific action.
    Warming {
        ops: Arc<dyn ContainerOps>,
        action: Arc<ActionSpec>,
        invocation_namespace: String,
        last_used: DateTime<Utc>,
        active: u32,
    },
    /// Bound to a specific action, reusable.
    Warmed {
        ops: Arc<dyn ContainerOps>,
        action: Arc<ActionSpec>,
        invocation_namespace: String,
        last_used: DateTime<Utc>,
        active: u32,
    },
}

impl ContainerData {
    /// Activations currently in flight.
    pub fn active(&self) -> u32 {
        match self {
            ContainerData::WarmingCold { active, .. }
            | ContainerData::Warming { active, .. }
            | ContainerData::Warmed { active, .. } => *active,
            _ => 0,
        }
    }

    pub(crate) fn increment_active(&mut self) {
        if let ContainerData::WarmingCold { active, .. }
        | ContainerData::Warming { active, .. }
        | ContainerData::Warmed { active, .. } = self
        {
            *active += 1;
        }
    }

    pub(crate) fn decrement_active(&mut self) {
        if let ContainerData::WarmingCold { active, .. }
        | ContainerData::Warming { active, .. }
        | ContainerData::Warmed { active, .. } = self
        {
            *active = active.saturating_sub(1);
        }
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if let ContainerData::WarmingCold { last_used, .. }
        | ContainerData::Warming { last_used, .. }
        | ContainerData::Warmed { last_used, .. } = self
        {
            *last_used = now;
        }
    }

    /// The container handle, when one exists.
    pub fn ops(&self) -> Option<Arc<dyn ContainerOps>> {
        match self {
            ContainerData::PreWarmed { ops, .. }
            | ContainerData::Warming { ops, .. }
            | ContainerData::Warmed { ops, .. } => Some(Arc::clone(ops)),
            _ => None,
        }
    }

    /// The action this container is bound to, when any.
    pub fn action(&self) -> Option<Arc<ActionSpec>> {
        match self {
            ContainerData::WarmingCold { action, .. }
            | ContainerData::Warming { action, .. }
            | ContainerData::Warmed { action, .. } => Some(Arc::clone(action)),
            _ => None,
        }
    }

    pub fn invocation_namespace(&self) -> Option<&str> {
        match self {
            ContainerData::WarmingCold {
                invocation_namespace,
                ..
            }
            | ContainerData::Warming {
                invocation_namespace,
                ..
            }
            | ContainerData::Warmed {
                invocation_namespace,
                ..
            } => Some(invocation_namespace),
            _ => None,
        }
    }

    /// Whether a reusable, initialized container is established.
    pub fn is_warmed(&self) -> bool {
        matches!(self, ContainerData::Warmed { .. })
    }

    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        match self {
            ContainerData::WarmingCold { last_used, .. }
            | ContainerData::Warming { last_used, .. }
            | ContainerData::Warmed { last_used, .. } => Some(*last_used),
            _ => None,
        }
    }
}

impl fmt::Debug for ContainerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerData::None => write!(f, "None"),
            ContainerData::Resources { memory_mb } => {
                write!(f, "Resources({memory_mb}MB)")
            }
            ContainerData::PreWarmed { ops, kind, memory_mb } => {
                write!(f, "PreWarmed({}, {kind}, {memory_mb}MB)", ops.id())
            }
            ContainerData::WarmingCold { action, active, .. } => {
                write!(
                    f,
                    "WarmingCold({}, active={active})",
                    action.fully_qualified_name()
                )
            }
            ContainerData::Warming { ops, action, active, .. } => {
                write!(
                    f,
                    "Warming({}, {}, active={active})",
                    ops.id(),
                    action.fully_qualified_name()
                )
            }
            ContainerData::Warmed { ops, action, active, .. } => {
                write!(
                    f,
                    "Warmed({}, {}, active={active})",
                    ops.id(),
                    action.fully_qualified_name()
                )
            }
        }
    }
}
