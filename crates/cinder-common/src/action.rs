//! Action metadata: what gets executed and under which limits.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Resource limits attached to an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLimits {
    /// Maximum wall-clock run time in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Memory reserved for the container in MB.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u32,
    /// Maximum bytes of logs collected per activation (0 disables collection).
    #[serde(default = "default_log_limit_bytes")]
    pub log_limit_bytes: u64,
    /// Maximum activations allowed in flight on one container.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_memory_mb() -> u32 {
    256
}

fn default_log_limit_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_concurrency() -> u32 {
    1
}

impl Default for ActionLimits {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            memory_mb: default_memory_mb(),
            log_limit_bytes: default_log_limit_bytes(),
            concurrency: default_concurrency(),
        }
    }
}

impl ActionLimits {
    /// Get the run timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// An executable action as the proxy sees it: code, runtime kind, limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Namespace the action lives in.
    pub namespace: String,
    /// Action name within its namespace.
    pub name: String,
    /// Runtime kind, e.g. `nodejs:20` or `python:3.12`.
    pub kind: String,
    /// Source or archive handed to the runtime on initialize.
    pub code: Option<String>,
    /// True when `code` is a base64 binary archive.
    #[serde(default)]
    pub binary: bool,
    /// Entry point inside the code, when the runtime needs one.
    pub main: Option<String>,
    /// Resource limits.
    #[serde(default)]
    pub limits: ActionLimits,
    /// When set, the user's API key is exposed in the run environment.
    #[serde(default)]
    pub provide_api_key: bool,
}

impl ActionSpec {
    /// Fully qualified `namespace/name` path of this action.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Whether more than one activation may run on a single container.
    pub fn concurrency_enabled(&self) -> bool {
        self.limits.concurrency > 1
    }

    /// The initializer payload sent to a fresh container.
    pub fn init_payload(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "main": self.main.as_deref().unwrap_or("main"),
            "code": self.code,
            "binary": self.binary,
        })
    }
}
