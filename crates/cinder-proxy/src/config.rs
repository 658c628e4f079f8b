//! Proxy timing and publishing knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one container proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Idle time in a ready container before it is suspended, in millis.
    #[serde(default = "default_pause_grace_ms")]
    pub pause_grace_ms: u64,
    /// Time a paused container is kept before it is destroyed, in millis.
    #[serde(default = "default_unused_timeout_ms")]
    pub unused_timeout_ms: u64,
    /// Upper bound on each ack/store call, in millis, so shutdown stays
    /// deterministic even when a publish never completes.
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    /// Largest response, in bytes, that may ride inline in the ack instead
    /// of being stored (applies only to actions with a zero log limit).
    #[serde(default = "default_inline_response_limit")]
    pub inline_response_limit: usize,
}

fn default_pause_grace_ms() -> u64 {
    50
}

fn default_unused_timeout_ms() -> u64 {
    10 * 60 * 1000
}

fn default_publish_timeout_ms() -> u64 {
    30_000
}

fn default_inline_response_limit() -> usize {
    16 * 1024
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            pause_grace_ms: default_pause_grace_ms(),
            unused_timeout_ms: default_unused_timeout_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
            inline_response_limit: default_inline_response_limit(),
        }
    }
}

impl ProxyConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?
            .try_deserialize()
    }

    pub fn pause_grace(&self) -> Duration {
        Duration::from_millis(self.pause_grace_ms)
    }

    pub fn unused_timeout(&self) -> Duration {
        Duration::from_millis(self.unused_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.pause_grace(), Duration::from_millis(50));
        assert_eq!(config.unused_timeout(), Duration::from_secs(600));
        assert_eq!(config.publish_timeout(), Duration::from_secs(30));
        assert_eq!(config.inline_response_limit, 16 * 1024);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: ProxyConfig = serde_json::from_str("{\"pause_grace_ms\": 100}").unwrap();
        assert_eq!(config.pause_grace(), Duration::from_millis(100));
        assert_eq!(config.unused_timeout(), Duration::from_secs(600));
    }
}
