//! # cinder-container
//!
//! The capability surface over one sandboxed container.
//!
//! A container here is any isolated execution environment that can be
//! initialized with action code, run activations, stream logs, and be
//! suspended, resumed, and destroyed. Concrete runtime drivers (Docker,
//! Kubernetes, microVMs) live behind the [`ContainerOps`] and
//! [`ContainerFactory`] traits; this crate only fixes the contract the
//! container proxy drives.
//!
//! It also owns the run-environment boundary: how invocation arguments are
//! partitioned into environment entries vs. main parameters, and which
//! fields the runtime sees in its environment record.

mod env;
mod error;
mod factory;
mod logs;
mod ops;

pub use env::{partition_arguments, RunEnv};
pub use error::OpsError;
pub use factory::{shutdown, ContainerFactory, ContainerName, CONTAINER_NAME_PREFIX};
pub use logs::{ActivationLogs, LogCollectError, LogCollector, SentinelLogCollector};
pub use ops::{ContainerId, ContainerOps, LogStream};
