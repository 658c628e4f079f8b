//! Identifier types used throughout the Cinder platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one activation of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivationId(Uuid);

impl ActivationId {
    /// Create a new random activation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ActivationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl From<Uuid> for ActivationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifier of the request that caused the current work.
///
/// A transaction ID is minted at the ingress boundary and passed explicitly
/// through every call so that logs, cache markers, and published records can
/// all be attributed to the originating request. It carries the wall-clock
/// instant the request arrived, which the proxy uses to compute the
/// `waitTime` annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionId {
    id: String,
    started: DateTime<Utc>,
}

impl TransactionId {
    /// Mint a new transaction ID starting now.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            started: Utc::now(),
        }
    }

    /// Create a transaction ID with an explicit start instant.
    pub fn starting_at(started: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            started,
        }
    }

    /// The opaque request identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the originating request arrived.
    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Identifier of the controller instance that dispatched an activation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerId(String);

impl ControllerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ControllerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The subject on whose behalf an activation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Namespace the invocation is billed against.
    pub namespace: String,
    /// Stable user identifier.
    pub user_id: String,
    /// API key, present only when the subject supplied one.
    pub api_key: Option<String>,
}

impl Identity {
    pub fn new(namespace: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            user_id: user_id.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_id_unique() {
        assert_ne!(ActivationId::new(), ActivationId::new());
    }

    #[test]
    fn test_activation_id_display_is_simple_uuid() {
        let id = ActivationId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 32);
        assert!(!s.contains('-'));
    }

    #[test]
    fn test_transaction_id_carries_start() {
        let start = Utc::now();
        let txn = TransactionId::starting_at(start);
        assert_eq!(txn.started(), start);
        assert!(!txn.id().is_empty());
    }

    #[test]
    fn test_identity_api_key() {
        let identity = Identity::new("guest", "u-1").with_api_key("k:s");
        assert_eq!(identity.api_key.as_deref(), Some("k:s"));
    }
}
