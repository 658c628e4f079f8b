//! The run-environment boundary.
//!
//! Two things are fixed here: how invocation arguments split into
//! environment entries vs. main parameters, and which fields the runtime
//! sees in its environment record for each activation.

use cinder_common::{ActionSpec, ActivationMessage};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Split invocation arguments by the stable partitioning rule: keys whose
/// first character is ASCII uppercase become environment entries, everything
/// else stays a main parameter. The union of the two maps is the input.
pub fn partition_arguments(args: &Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut env = Map::new();
    let mut params = Map::new();
    for (key, value) in args {
        if key.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
            env.insert(key.clone(), value.clone());
        } else {
            params.insert(key.clone(), value.clone());
        }
    }
    (env, params)
}

/// Builder for the environment record handed to `run`.
pub struct RunEnv<'a> {
    action: &'a ActionSpec,
    message: &'a ActivationMessage,
    deadline: DateTime<Utc>,
}

impl<'a> RunEnv<'a> {
    pub fn new(
        action: &'a ActionSpec,
        message: &'a ActivationMessage,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            action,
            message,
            deadline,
        }
    }

    /// Build the record. The API key is present only when the action opted
    /// in via its `provide-api-key` annotation and the subject has one.
    pub fn build(&self) -> Value {
        let mut env = Map::new();
        env.insert(
            "namespace".into(),
            Value::from(self.message.user.namespace.clone()),
        );
        env.insert(
            "action_name".into(),
            Value::from(self.action.fully_qualified_name()),
        );
        env.insert(
            "activation_id".into(),
            Value::from(self.message.activation_id.to_string()),
        );
        env.insert(
            "transaction_id".into(),
            Value::from(self.message.transid.id().to_string()),
        );
        // Deadline crosses the boundary as epoch millis in a string so
        // runtimes without 64-bit integers keep full precision.
        env.insert(
            "deadline".into(),
            Value::from(self.deadline.timestamp_millis().to_string()),
        );
        if self.action.provide_api_key {
            if let Some(key) = &self.message.user.api_key {
                env.insert("api_key".into(), Value::from(key.clone()));
            }
        }
        Value::Object(env)
    }
}
