use serde_json::Value;
use std::collections::HashSet;

use aura_core::{AuraError, Payload, Result};

/// Payload keys under which a handler-parameter map may arrive.
pub const HANDLER_KEYS: &[&str] = &["handlers", "Handlers", "handlerParameters"];

/// One normalized fan-out branch: the parameter name keys the branch result
/// in the aggregated payload; the topic is the event emitted for the branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerBinding {
    pub parameter: String,
    pub topic: String,
}

/// The accepted handler-parameter shapes, tagged. A single normalization
/// step produces the canonical parameter → topic list; everything downstream
/// sees only [`HandlerBinding`]s.
#[derive(Debug, Clone)]
pub enum HandlerSpec {
    /// `{name → topic}` mapping, used directly.
    Map(Payload),
    /// Sequence of topics; each parameter is inferred from its topic.
    StringList(Vec<String>),
    /// Sequence of `{parameterName, handlerName}` objects (field aliases
    /// accepted case-insensitively).
    ObjectList(Vec<Payload>),
    /// A single topic string.
    Single(String),
}

impl HandlerSpec {
    /// The raw handler-parameter value carried by a payload, if any.
    pub fn detect(payload: &Payload) -> Option<&Value> {
        HANDLER_KEYS.iter().find_map(|k| payload.get(*k))
    }

    /// Classify a raw handler-parameter value into its tagged shape.
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::Map(map.clone())),
            Value::String(topic) => Ok(Self::Single(topic.clone())),
            Value::Array(items) => {
                if items.iter().all(Value::is_string) {
                    Ok(Self::StringList(
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect(),
                    ))
                } else if items.iter().all(Value::is_object) {
                    Ok(Self::ObjectList(
                        items
                            .iter()
                            .filter_map(Value::as_object)
                            .cloned()
                            .collect(),
                    ))
                } else {
                    Err(AuraError::HandlerSpec(
                        "handler list mixes strings and objects".into(),
                    ))
                }
            }
            other => Err(AuraError::HandlerSpec(format!(
                "unsupported handler spec shape: {}",
                type_name(other)
            ))),
        }
    }

    /// Normalize into the canonical binding list, rejecting duplicate
    /// parameter names and empty handler topics.
    pub fn normalize(&self) -> Result<Vec<HandlerBinding>> {
        let bindings = match self {
            Self::Map(map) => map
                .iter()
                .map(|(parameter, value)| {
                    let topic = value.as_str().ok_or_else(|| {
                        AuraError::HandlerSpec(format!(
                            "handler topic for {parameter:?} must be a string"
                        ))
                    })?;
                    Ok(HandlerBinding {
                        parameter: parameter.clone(),
                        topic: topic.to_string(),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Self::StringList(topics) => topics
                .iter()
                .enumerate()
                .map(|(index, topic)| HandlerBinding {
                    parameter: infer_parameter(topic).unwrap_or_else(|| format!("param_{index}")),
                    topic: topic.clone(),
                })
                .collect(),
            Self::ObjectList(objects) => objects
                .iter()
                .enumerate()
                .map(|(index, object)| {
                    let topic = alias_str(object, &["handlername", "handler", "eventname"])
                        .unwrap_or_default();
                    let parameter = alias_str(object, &["parametername", "parameter", "name"])
                        .map(str::to_string)
                        .or_else(|| infer_parameter(&topic))
                        .unwrap_or_else(|| format!("param_{index}"));
                    HandlerBinding {
                        parameter,
                        topic: topic.to_string(),
                    }
                })
                .collect(),
            Self::Single(topic) => vec![HandlerBinding {
                parameter: infer_parameter(topic).unwrap_or_else(|| "param_0".to_string()),
                topic: topic.clone(),
            }],
        };

        let mut seen = HashSet::new();
        for binding in &bindings {
            if binding.topic.is_empty() {
                return Err(AuraError::HandlerSpec(format!(
                    "empty handler topic for parameter {:?}",
                    binding.parameter
                )));
            }
            if !seen.insert(binding.parameter.as_str()) {
                return Err(AuraError::HandlerSpec(format!(
                    "duplicate parameter name {:?}",
                    binding.parameter
                )));
            }
        }
        Ok(bindings)
    }
}

/// Parameter inferred from a topic: its first dot-separated segment.
fn infer_parameter(topic: &str) -> Option<String> {
    topic
        .split('.')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Case-insensitive lookup of the first present alias holding a string.
/// Aliases are tried in priority order.
fn alias_str<'a>(object: &'a Payload, aliases: &[&str]) -> Option<&'a str> {
    aliases.iter().find_map(|alias| {
        object
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(alias))
            .and_then(|(_, value)| value.as_str())
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
