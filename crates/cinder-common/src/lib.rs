//! # cinder-common
//!
//! Shared domain types for the Cinder function execution core.
//!
//! This crate holds the value types that flow between the container proxy,
//! the pool, the metadata cache, and the publish contracts:
//!
//! - Identifiers: [`ActivationId`], [`TransactionId`], [`ControllerId`]
//! - The action being invoked: [`ActionSpec`] and its [`ActionLimits`]
//! - The invocation request: [`ActivationMessage`]
//! - The invocation result: [`ActivationRecord`], [`ActivationResponse`],
//!   [`Interval`], [`Annotations`]
//! - A [`Clock`] seam so timing is injectable in tests
//!
//! Everything here is plain data: no I/O, no tasks.

mod action;
mod activation;
mod message;
pub mod telemetry;
mod time;
mod types;

pub use action::{ActionLimits, ActionSpec};
pub use activation::{
    annotation, ActivationRecord, ActivationResponse, Annotations, Interval, ResponseKind,
};
pub use message::ActivationMessage;
pub use time::{Clock, SystemClock};
pub use types::{ActivationId, ControllerId, Identity, TransactionId};
