use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde_json::json;

use aura_bus::{AgentBus, AgentSpec, EmitOptions};
use aura_core::{handler_fn, into_payload, Payload};

const SERVICE_NAME: &str = "time-service";

/// Time queries and arithmetic as an ordinary bus subscriber.
///
/// Handles `system.time.now|parse|format|add|diff|timezone`; each operation
/// emits `<topic>.success` or `<topic>.error`. Timestamps travel as RFC 3339
/// strings.
pub struct TimeService;

impl TimeService {
    pub fn register(bus: &Arc<AgentBus>) -> aura_core::Result<String> {
        let agent_id = bus.join_bus(
            AgentSpec::new(SERVICE_NAME, "service")
                .with_filter("system.time.now")
                .with_filter("system.time.parse")
                .with_filter("system.time.format")
                .with_filter("system.time.add")
                .with_filter("system.time.diff")
                .with_filter("system.time.timezone"),
        );

        for topic in [
            "system.time.now",
            "system.time.parse",
            "system.time.format",
            "system.time.add",
            "system.time.diff",
            "system.time.timezone",
        ] {
            let handler_bus = Arc::clone(bus);
            bus.subscribe(
                &agent_id,
                topic,
                handler_fn(move |_sender, topic, payload: Payload| {
                    let bus = Arc::clone(&handler_bus);
                    async move {
                        match evaluate(&topic, &payload) {
                            Ok(result) => {
                                respond(&bus, &format!("{topic}.success"), result).await;
                                true
                            }
                            Err(error) => {
                                respond(&bus, &format!("{topic}.error"), json!({ "error": error }))
                                    .await;
                                false
                            }
                        }
                    }
                }),
            )?;
        }

        Ok(agent_id)
    }
}

fn evaluate(topic: &str, payload: &Payload) -> Result<serde_json::Value, String> {
    match topic.rsplit('.').next().unwrap_or_default() {
        "now" => {
            let now = Utc::now();
            Ok(json!({ "timestamp": now.to_rfc3339(), "unixMs": now.timestamp_millis() }))
        }
        "parse" => {
            let text = required_str(payload, "text")?;
            let parsed = match payload.get("format").and_then(|v| v.as_str()) {
                Some(format) => NaiveDateTime::parse_from_str(text, format)
                    .map(|naive| Utc.from_utc_datetime(&naive))
                    .map_err(|e| format!("parse failed: {e}"))?,
                None => DateTime::parse_from_rfc3339(text)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| format!("parse failed: {e}"))?,
            };
            Ok(json!({
                "timestamp": parsed.to_rfc3339(),
                "unixMs": parsed.timestamp_millis(),
            }))
        }
        "format" => {
            let timestamp = required_timestamp(payload, "timestamp")?;
            let format = required_str(payload, "format")?;
            Ok(json!({ "formatted": timestamp.format(format).to_string() }))
        }
        "add" => {
            let timestamp = required_timestamp(payload, "timestamp")?;
            let mut result = timestamp;
            let units: [(&str, fn(i64) -> Duration); 5] = [
                ("days", Duration::days),
                ("hours", Duration::hours),
                ("minutes", Duration::minutes),
                ("seconds", Duration::seconds),
                ("ms", Duration::milliseconds),
            ];
            for (key, make) in units {
                if let Some(amount) = payload.get(key).and_then(|v| v.as_i64()) {
                    result = result + make(amount);
                }
            }
            Ok(json!({ "timestamp": result.to_rfc3339() }))
        }
        "diff" => {
            let from = required_timestamp(payload, "from")?;
            let to = required_timestamp(payload, "to")?;
            let delta = to - from;
            Ok(json!({
                "ms": delta.num_milliseconds(),
                "seconds": delta.num_seconds(),
            }))
        }
        "timezone" => {
            let timestamp = required_timestamp(payload, "timestamp")?;
            let offset_minutes = payload
                .get("offsetMinutes")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| "missing offsetMinutes".to_string())?;
            let offset = FixedOffset::east_opt((offset_minutes * 60) as i32)
                .ok_or_else(|| format!("invalid offset: {offset_minutes} minutes"))?;
            Ok(json!({ "timestamp": timestamp.with_timezone(&offset).to_rfc3339() }))
        }
        other => Err(format!("unknown time operation: {other}")),
    }
}

fn required_str<'a>(payload: &'a Payload, key: &str) -> Result<&'a str, String> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {key}"))
}

fn required_timestamp(payload: &Payload, key: &str) -> Result<DateTime<Utc>, String> {
    let text = required_str(payload, key)?;
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid {key}: {e}"))
}

async fn respond(bus: &AgentBus, topic: &str, payload: serde_json::Value) {
    bus.emit_with(
        topic,
        into_payload(payload),
        EmitOptions::from_source(SERVICE_NAME),
    )
    .await;
}
