use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use aura_core::{
    short_id, DeliveryScope, EmitInterceptor, EventSource, Payload, SharedHandler, SubscriptionId,
};

use crate::agent::{AgentProfile, AgentSpec};
use crate::router::{Delivery, RouterMetrics, TopicRouter};

/// Routing options for a single emission.
#[derive(Debug, Clone)]
pub struct EmitOptions {
    /// Who is emitting. Decorated per receiving agent for observability.
    pub source: String,
    /// Override the receiving agents' own scopes for this emission.
    pub forced_scope: Option<DeliveryScope>,
    /// Restrict Channel-scoped delivery to members of this channel.
    pub target_channel: Option<String>,
    /// Restrict Role-scoped delivery to agents holding this role.
    pub target_role: Option<String>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            source: "system".to_string(),
            forced_scope: None,
            target_channel: None,
            target_role: None,
        }
    }
}

impl EmitOptions {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: DeliveryScope) -> Self {
        self.forced_scope = Some(scope);
        self
    }

    pub fn to_channel(mut self, channel: impl Into<String>) -> Self {
        self.target_channel = Some(channel.into());
        self
    }

    pub fn to_role(mut self, role: impl Into<String>) -> Self {
        self.target_role = Some(role.into());
        self
    }
}

/// Agent registry state. All three indices mutate under one lock so they can
/// never be observed out of lockstep.
#[derive(Default)]
struct Registry {
    agents: HashMap<String, AgentProfile>,
    channel_members: HashMap<String, HashSet<String>>,
    role_members: HashMap<String, HashSet<String>>,
}

impl Registry {
    /// Registry bookkeeping desync is the one fatal error class: it means a
    /// code defect, so fail loudly and immediately.
    fn verify_integrity(&self) {
        for (id, agent) in &self.agents {
            if !self
                .role_members
                .get(&agent.role)
                .is_some_and(|m| m.contains(id))
            {
                panic!("registry desync: agent {id} missing from role index {:?}", agent.role);
            }
            for channel in &agent.channels {
                if !self
                    .channel_members
                    .get(channel)
                    .is_some_and(|m| m.contains(id))
                {
                    panic!("registry desync: agent {id} missing from channel index {channel:?}");
                }
            }
        }
        for (channel, members) in &self.channel_members {
            for id in members {
                let Some(agent) = self.agents.get(id) else {
                    panic!("registry desync: channel {channel:?} references unknown agent {id}");
                };
                if !agent.channels.contains(channel) {
                    panic!("registry desync: channel {channel:?} references non-member agent {id}");
                }
            }
        }
        for (role, members) in &self.role_members {
            for id in members {
                let Some(agent) = self.agents.get(id) else {
                    panic!("registry desync: role {role:?} references unknown agent {id}");
                };
                if &agent.role != role {
                    panic!("registry desync: role {role:?} references agent {id} with role {:?}", agent.role);
                }
            }
        }
    }
}

/// The scoped agent bus: a [`TopicRouter`] plus agent identity, channel and
/// role membership, per-agent event filters, and scope-based delivery
/// predicates.
pub struct AgentBus {
    router: TopicRouter,
    registry: RwLock<Registry>,
    interceptor: RwLock<Option<Arc<dyn EmitInterceptor>>>,
}

impl AgentBus {
    pub fn new() -> Self {
        Self {
            router: TopicRouter::new(),
            registry: RwLock::new(Registry::default()),
            interceptor: RwLock::new(None),
        }
    }

    /// Install the emission interceptor consulted before normal dispatch.
    /// The bus knows nothing about what the interceptor does; it only honors
    /// the consumed/not-consumed verdict.
    pub fn set_interceptor(&self, interceptor: Arc<dyn EmitInterceptor>) {
        *self.interceptor.write() = Some(interceptor);
    }

    // ── Agent lifecycle ────────────────────────────────────────

    /// Register an agent. Returns its short unique id.
    pub fn join_bus(&self, spec: AgentSpec) -> String {
        let id = match &spec.instance {
            Some(instance) => short_id(&format!("{}-{}", spec.name, instance)),
            None => short_id(&spec.name),
        };
        let profile = AgentProfile {
            id: id.clone(),
            name: spec.name,
            role: spec.role,
            scope: spec.scope,
            channels: spec.channels.into_iter().collect(),
            event_filters: spec.event_filters.into_iter().collect(),
            instance: spec.instance,
            joined_at: Utc::now(),
            active: true,
        };

        let mut registry = self.registry.write();
        registry
            .role_members
            .entry(profile.role.clone())
            .or_default()
            .insert(id.clone());
        for channel in &profile.channels {
            registry
                .channel_members
                .entry(channel.clone())
                .or_default()
                .insert(id.clone());
        }
        info!(
            agent_id = %id,
            name = %profile.name,
            role = %profile.role,
            scope = %profile.scope,
            "agent joined bus"
        );
        registry.agents.insert(id.clone(), profile);
        registry.verify_integrity();
        id
    }

    /// Deregister an agent, cascading removal of its subscriptions and
    /// channel/role memberships. Returns `false` for an unknown id.
    pub fn leave_bus(&self, agent_id: &str) -> bool {
        let mut registry = self.registry.write();
        let Some(mut agent) = registry.agents.remove(agent_id) else {
            debug!(agent_id, "leave_bus for unknown agent");
            return false;
        };
        agent.active = false;

        if let Some(members) = registry.role_members.get_mut(&agent.role) {
            members.remove(agent_id);
            if members.is_empty() {
                registry.role_members.remove(&agent.role);
            }
        }
        for channel in &agent.channels {
            if let Some(members) = registry.channel_members.get_mut(channel) {
                members.remove(agent_id);
                if members.is_empty() {
                    registry.channel_members.remove(channel);
                }
            }
        }
        registry.verify_integrity();
        drop(registry);

        let removed = self.router.remove_agent(agent_id);
        info!(agent_id, name = %agent.name, subscriptions = removed, "agent left bus");
        true
    }

    pub fn join_channel(&self, agent_id: &str, channel: &str) -> aura_core::Result<()> {
        let mut guard = self.registry.write();
        let registry = &mut *guard;
        let agent = registry
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| aura_core::AuraError::AgentNotFound(agent_id.to_string()))?;
        agent.channels.insert(channel.to_string());
        registry
            .channel_members
            .entry(channel.to_string())
            .or_default()
            .insert(agent_id.to_string());
        registry.verify_integrity();
        debug!(agent_id, channel, "agent joined channel");
        Ok(())
    }

    pub fn leave_channel(&self, agent_id: &str, channel: &str) -> aura_core::Result<()> {
        let mut guard = self.registry.write();
        let registry = &mut *guard;
        let agent = registry
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| aura_core::AuraError::AgentNotFound(agent_id.to_string()))?;
        agent.channels.remove(channel);
        if let Some(members) = registry.channel_members.get_mut(channel) {
            members.remove(agent_id);
            if members.is_empty() {
                registry.channel_members.remove(channel);
            }
        }
        registry.verify_integrity();
        debug!(agent_id, channel, "agent left channel");
        Ok(())
    }

    /// Snapshot of a registered agent.
    pub fn agent(&self, agent_id: &str) -> Option<AgentProfile> {
        self.registry.read().agents.get(agent_id).cloned()
    }

    /// Snapshot of all registered agents.
    pub fn agents(&self) -> Vec<AgentProfile> {
        self.registry.read().agents.values().cloned().collect()
    }

    /// Agents currently in a channel.
    pub fn channel_members(&self, channel: &str) -> Vec<String> {
        self.registry
            .read()
            .channel_members
            .get(channel)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Agents currently holding a role.
    pub fn role_members(&self, role: &str) -> Vec<String> {
        self.registry
            .read()
            .role_members
            .get(role)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    // ── Subscriptions ──────────────────────────────────────────

    /// Subscribe an agent's handler to an exact topic or `prefix.*` pattern.
    pub fn subscribe(
        &self,
        agent_id: &str,
        pattern: &str,
        handler: SharedHandler,
    ) -> aura_core::Result<SubscriptionId> {
        if !self.registry.read().agents.contains_key(agent_id) {
            return Err(aura_core::AuraError::AgentNotFound(agent_id.to_string()));
        }
        Ok(self
            .router
            .subscribe(pattern, handler, Some(agent_id.to_string())))
    }

    /// Remove a subscription by `(pattern, handler identity)`.
    pub fn unsubscribe(&self, pattern: &str, handler: &SharedHandler) -> bool {
        self.router.unsubscribe(pattern, handler)
    }

    /// Remove a subscription by id.
    pub fn unsubscribe_id(&self, id: SubscriptionId) -> bool {
        self.router.unsubscribe_id(id)
    }

    // ── Emission ───────────────────────────────────────────────

    /// Emit with default options (source `"system"`, no scope overrides).
    pub async fn emit(&self, topic: &str, payload: Payload) -> usize {
        self.emit_with(topic, payload, EmitOptions::default()).await
    }

    /// Emit with explicit routing options. Returns the number of handlers
    /// invoked; per-handler errors are never re-raised.
    pub async fn emit_with(&self, topic: &str, payload: Payload, options: EmitOptions) -> usize {
        let interceptor = self.interceptor.read().clone();
        if let Some(interceptor) = interceptor {
            if interceptor
                .intercept(topic, &payload, &options.source)
                .await
            {
                debug!(topic, "emission consumed by interceptor");
                return 0;
            }
        }

        let entries = self.router.matches(topic, true);
        let mut deliveries = Vec::with_capacity(entries.len());
        {
            let registry = self.registry.read();
            for entry in entries {
                let sender = match &entry.agent_id {
                    // Bus-owned service handlers always receive the event.
                    None => options.source.clone(),
                    Some(agent_id) => {
                        let Some(agent) = registry.agents.get(agent_id) else {
                            // Stale subscription; leave_bus cascade should
                            // make this unreachable.
                            continue;
                        };
                        if !self.should_deliver(agent, topic, &options) {
                            continue;
                        }
                        format!("{}→{}", options.source, agent.name)
                    }
                };
                deliveries.push(Delivery {
                    handler: entry.handler,
                    sender,
                    topic: topic.to_string(),
                    payload: payload.clone(),
                });
            }
        }
        self.router.dispatch(deliveries).await
    }

    /// Scope predicate: does this emission reach this agent?
    fn should_deliver(&self, agent: &AgentProfile, topic: &str, options: &EmitOptions) -> bool {
        if !agent.active || !agent.accepts(topic) {
            return false;
        }
        // An explicit target constrains every agent, whatever its scope: a
        // role-targeted emission reaches only holders of that role, a
        // channel-targeted one only members of that channel.
        if let Some(role) = &options.target_role {
            if &agent.role != role {
                return false;
            }
        }
        if let Some(channel) = &options.target_channel {
            if !agent.channels.contains(channel) {
                return false;
            }
        }
        match options.forced_scope.unwrap_or(agent.scope) {
            // Agent scope is reserved for intra-agent plumbing handled by the
            // owning agent directly, not the shared bus.
            DeliveryScope::Agent => false,
            DeliveryScope::Global | DeliveryScope::Channel | DeliveryScope::Role => true,
            // Hierarchy traversal is a future extension; delivers like Global.
            DeliveryScope::Hierarchy => true,
        }
    }

    /// Dispatch counters accumulated since construction.
    pub fn metrics(&self) -> RouterMetrics {
        self.router.metrics()
    }
}

impl Default for AgentBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for AgentBus {
    async fn emit(&self, topic: &str, payload: Payload, source: &str) -> usize {
        self.emit_with(topic, payload, EmitOptions::from_source(source))
            .await
    }

    async fn subscribe(&self, pattern: &str, handler: SharedHandler) -> SubscriptionId {
        self.router.subscribe(pattern, handler, None)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.router.unsubscribe_id(id)
    }
}
