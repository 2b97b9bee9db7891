use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Origin of the process-wide monotonic clock. Event timestamps are
/// nanoseconds elapsed since this instant, so comparisons between events are
/// immune to wall-clock adjustments.
static CLOCK_ORIGIN: Lazy<Instant> = Lazy::new(Instant::now);

/// Nanoseconds since the process clock origin.
pub fn monotonic_ns() -> u64 {
    CLOCK_ORIGIN.elapsed().as_nanos() as u64
}

/// Heterogeneous event payload: a JSON object mapping keys to arbitrary
/// values (nested mappings, sequences, primitives).
pub type Payload = serde_json::Map<String, Value>;

/// Coerce an arbitrary JSON value into a payload mapping.
/// Non-object values are wrapped under a `"value"` key.
pub fn into_payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Fetch the first string value present under any of the given keys.
/// Used for payload fields that accept legacy aliases (e.g. `contents` /
/// `content`).
pub fn first_str<'a>(payload: &'a Payload, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| payload.get(*k).and_then(Value::as_str))
}

/// An event flowing through the runtime.
///
/// Events are immutable once created: they are born on `emit`, live for the
/// duration of dispatch, and are never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Dot-separated lowercase routing key, e.g. `system.file.read`.
    pub topic: String,
    /// Heterogeneous payload mapping.
    pub payload: Payload,
    /// Monotonic creation timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// Who emitted the event.
    pub source: String,
}

impl Event {
    /// Create a new event stamped with the current monotonic time.
    pub fn new(topic: impl Into<String>, payload: Payload, source: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp_ns: monotonic_ns(),
            source: source.into(),
        }
    }

    /// Age of the event relative to the current monotonic time.
    pub fn age(&self) -> Duration {
        Duration::from_nanos(monotonic_ns().saturating_sub(self.timestamp_ns))
    }
}
