use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use aura_core::DeliveryScope;

/// Everything needed to join the bus. Built with the `with_*` helpers:
///
/// ```ignore
/// let spec = AgentSpec::new("analyzer", "worker")
///     .with_scope(DeliveryScope::Role)
///     .with_channel("alpha")
///     .with_filter("work.start");
/// ```
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub name: String,
    pub role: String,
    pub scope: DeliveryScope,
    pub channels: Vec<String>,
    /// Topics this agent accepts. Empty = allow all.
    pub event_filters: Vec<String>,
    /// Optional discriminator when several instances of the same agent join.
    pub instance: Option<String>,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            scope: DeliveryScope::Global,
            channels: Vec::new(),
            event_filters: Vec::new(),
            instance: None,
        }
    }

    pub fn with_scope(mut self, scope: DeliveryScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channels.push(channel.into());
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels.extend(channels.into_iter().map(Into::into));
        self
    }

    pub fn with_filter(mut self, topic: impl Into<String>) -> Self {
        self.event_filters.push(topic.into());
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

/// A registered agent as tracked by the bus.
#[derive(Debug, Clone, Serialize)]
pub struct AgentProfile {
    /// Short unique id, stable for the agent's lifetime.
    pub id: String,
    pub name: String,
    pub role: String,
    pub scope: DeliveryScope,
    pub channels: HashSet<String>,
    /// Topics this agent accepts. Empty = allow all.
    pub event_filters: HashSet<String>,
    pub instance: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub active: bool,
}

impl AgentProfile {
    /// Whether the agent's filter allow-list admits this topic.
    pub fn accepts(&self, topic: &str) -> bool {
        self.event_filters.is_empty() || self.event_filters.contains(topic)
    }
}
