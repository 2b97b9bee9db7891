use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery predicate determining which emissions reach an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryScope {
    /// Deliver every emission.
    Global,
    /// Reserved for intra-agent plumbing handled by the owning agent
    /// directly; the shared bus skips these agents.
    Agent,
    /// Deliver when the emission targets a channel the agent has joined
    /// (or targets no channel at all).
    Channel,
    /// Deliver when the emission targets the agent's role (or no role).
    Role,
    /// Hierarchy traversal is a future extension; delivers like `Global`.
    Hierarchy,
}

impl Default for DeliveryScope {
    fn default() -> Self {
        Self::Global
    }
}

impl std::fmt::Display for DeliveryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Global => "global",
            Self::Agent => "agent",
            Self::Channel => "channel",
            Self::Role => "role",
            Self::Hierarchy => "hierarchy",
        };
        write!(f, "{name}")
    }
}

/// Generate a short unique id for an agent: a lowercased slug of the name
/// plus eight hex characters, e.g. `analyzer-3fa9c1d2`.
pub fn short_id(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-');
    let suffix = Uuid::new_v4().simple().to_string();
    if slug.is_empty() {
        format!("agent-{}", &suffix[..8])
    } else {
        format!("{}-{}", slug, &suffix[..8])
    }
}
