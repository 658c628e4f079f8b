//! The inbound activation request.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ActivationId, ControllerId, Identity, TransactionId};

/// One dispatched invocation, as routed from a controller to a proxy.
///
/// The transaction ID inside carries the instant the request arrived, which
/// anchors the `waitTime` accounting for this activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationMessage {
    pub transid: TransactionId,
    pub activation_id: ActivationId,
    /// Who is invoking.
    pub user: Identity,
    /// True when the caller is waiting on the result.
    pub blocking: bool,
    /// Invocation arguments, if any.
    pub content: Option<Value>,
    /// The controller that dispatched this message and expects the ack.
    pub controller: ControllerId,
}

impl ActivationMessage {
    /// A non-blocking message with fresh ids, for tests and internal use.
    pub fn simple(user: Identity, controller: ControllerId) -> Self {
        Self {
            transid: TransactionId::new(),
            activation_id: ActivationId::new(),
            user,
            blocking: false,
            content: None,
            controller,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_message_has_fresh_ids() {
        let user = Identity::new("guest", "u-1");
        let a = ActivationMessage::simple(user.clone(), ControllerId::new("c0"));
        let b = ActivationMessage::simple(user, ControllerId::new("c0"));
        assert_ne!(a.activation_id, b.activation_id);
        assert_ne!(a.transid.id(), b.transid.id());
        assert!(!a.blocking);
    }
}
