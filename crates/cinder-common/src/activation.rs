//! Activation results: timing intervals, responses, annotations, records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::types::ActivationId;

/// A closed wall-clock interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// A zero-length interval at the given instant.
    pub fn point(at: DateTime<Utc>) -> Self {
        Self { start: at, end: at }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration().num_milliseconds()
    }
}

/// How an activation concluded, in increasing order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// The action ran and returned a result.
    Success,
    /// The action ran and signalled an error of its own.
    ApplicationError,
    /// The action or its input is broken (init failure, timeout).
    DeveloperError,
    /// The platform failed; the user did nothing wrong.
    PlatformError,
}

impl ResponseKind {
    /// Stable numeric code recorded with the activation.
    pub fn status_code(&self) -> u32 {
        match self {
            ResponseKind::Success => 0,
            ResponseKind::ApplicationError => 1,
            ResponseKind::DeveloperError => 2,
            ResponseKind::PlatformError => 3,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseKind::Success)
    }
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseKind::Success => write!(f, "success"),
            ResponseKind::ApplicationError => write!(f, "application error"),
            ResponseKind::DeveloperError => write!(f, "developer error"),
            ResponseKind::PlatformError => write!(f, "platform error"),
        }
    }
}

/// The result payload of one activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationResponse {
    pub kind: ResponseKind,
    pub result: Option<Value>,
}

impl ActivationResponse {
    pub fn success(result: Option<Value>) -> Self {
        Self {
            kind: ResponseKind::Success,
            result,
        }
    }

    pub fn application_error(result: Value) -> Self {
        Self {
            kind: ResponseKind::ApplicationError,
            result: Some(result),
        }
    }

    pub fn developer_error(message: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::DeveloperError,
            result: Some(json!({ "error": message.into() })),
        }
    }

    pub fn platform_error(message: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::PlatformError,
            result: Some(json!({ "error": message.into() })),
        }
    }

    /// Serialized size of the result payload, for inline-storage decisions.
    pub fn result_size(&self) -> usize {
        self.result
            .as_ref()
            .map(|v| v.to_string().len())
            .unwrap_or(0)
    }
}

/// Well-known annotation keys.
pub mod annotation {
    /// Duration of the initialize interval, cold starts only.
    pub const INIT_TIME: &str = "initTime";
    /// Wall time from request arrival to the start of init (cold) or run (warm).
    pub const WAIT_TIME: &str = "waitTime";
    /// The limits the action ran under.
    pub const LIMITS: &str = "limits";
    /// Fully qualified action path.
    pub const PATH: &str = "path";
    /// Runtime kind.
    pub const KIND: &str = "kind";
}

/// Key/value annotations attached to an activation record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotations(serde_json::Map<String, Value>);

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The persisted record of one activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub namespace: String,
    pub name: String,
    pub activation_id: ActivationId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Billed duration in milliseconds: init + run for cold starts, run alone
    /// for warm ones.
    pub duration_ms: i64,
    pub response: ActivationResponse,
    pub logs: Vec<String>,
    pub annotations: Annotations,
}

impl ActivationRecord {
    /// Duration of the initialize interval, when this was a cold start.
    pub fn init_time_ms(&self) -> Option<i64> {
        self.annotations
            .get(annotation::INIT_TIME)
            .and_then(Value::as_i64)
    }

    pub fn wait_time_ms(&self) -> Option<i64> {
        self.annotations
            .get(annotation::WAIT_TIME)
            .and_then(Value::as_i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_interval_duration() {
        let start = Utc.timestamp_millis_opt(1_000).unwrap();
        let end = Utc.timestamp_millis_opt(1_250).unwrap();
        assert_eq!(Interval::new(start, end).duration_ms(), 250);
    }

    #[test]
    fn test_point_interval_is_empty() {
        let now = Utc::now();
        assert_eq!(Interval::point(now).duration_ms(), 0);
    }

    #[test]
    fn test_status_codes_are_ordered() {
        assert_eq!(ResponseKind::Success.status_code(), 0);
        assert_eq!(ResponseKind::ApplicationError.status_code(), 1);
        assert_eq!(ResponseKind::DeveloperError.status_code(), 2);
        assert_eq!(ResponseKind::PlatformError.status_code(), 3);
    }

    #[test]
    fn test_error_responses_wrap_message() {
        let resp = ActivationResponse::developer_error("bad init");
        assert_eq!(resp.result.unwrap()["error"], "bad init");
        assert!(!resp.kind.is_success());
    }

    #[test]
    fn test_result_size() {
        let resp = ActivationResponse::success(Some(json!({"ok": true})));
        assert_eq!(resp.result_size(), "{\"ok\":true}".len());
        assert_eq!(ActivationResponse::success(None).result_size(), 0);
    }

    #[test]
    fn test_annotations_round_trip() {
        let mut ann = Annotations::new();
        ann.set(annotation::INIT_TIME, 42);
        ann.set(annotation::KIND, "nodejs:20");
        assert_eq!(ann.get(annotation::INIT_TIME), Some(&json!(42)));
        assert!(ann.contains(annotation::KIND));
        assert!(!ann.contains(annotation::WAIT_TIME));
        assert_eq!(ann.len(), 2);
    }
}
