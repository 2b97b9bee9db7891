use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use aura_core::{handler_identity, Payload, SharedHandler, SubscriptionId};

/// One registered subscription.
#[derive(Clone)]
pub struct RouterEntry {
    pub id: SubscriptionId,
    pub handler: SharedHandler,
    /// Owning agent, or `None` for bus-owned service handlers.
    pub agent_id: Option<String>,
}

/// A single handler invocation prepared for dispatch.
pub struct Delivery {
    pub handler: SharedHandler,
    pub sender: String,
    pub topic: String,
    pub payload: Payload,
}

/// Counters accumulated across the router's lifetime.
#[derive(Default)]
struct RouterCounters {
    events_emitted: AtomicU64,
    handlers_invoked: AtomicU64,
    soft_failures: AtomicU64,
    suppressed_panics: AtomicU64,
}

/// Point-in-time view of the router counters.
#[derive(Debug, Clone, Serialize)]
pub struct RouterMetrics {
    pub events_emitted: u64,
    pub handlers_invoked: u64,
    pub soft_failures: u64,
    pub suppressed_panics: u64,
}

/// Topic-keyed subscription registry with concurrent handler invocation.
///
/// Patterns are either exact topics or `prefix.*` (single trailing wildcard
/// matching any further dot-separated segments). Topic strings are
/// case-sensitive and matched byte-exact.
pub struct TopicRouter {
    exact: DashMap<String, Vec<RouterEntry>>,
    /// Keyed by the prefix with the trailing `.*` stripped.
    wildcard: DashMap<String, Vec<RouterEntry>>,
    counters: RouterCounters,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self {
            exact: DashMap::new(),
            wildcard: DashMap::new(),
            counters: RouterCounters::default(),
        }
    }

    /// Register a handler under an exact topic or `prefix.*` pattern.
    ///
    /// Idempotent with respect to `(pattern, handler identity)`: subscribing
    /// the same handler to the same pattern twice returns the original
    /// subscription id and the handler fires once per emit.
    pub fn subscribe(
        &self,
        pattern: &str,
        handler: SharedHandler,
        agent_id: Option<String>,
    ) -> SubscriptionId {
        let (map, key) = self.slot(pattern);
        let mut entries = map.entry(key).or_default();
        let identity = handler_identity(&handler);
        if let Some(existing) = entries
            .iter()
            .find(|e| handler_identity(&e.handler) == identity)
        {
            debug!(pattern, id = %existing.id, "duplicate subscription deduplicated");
            return existing.id;
        }
        let id = Uuid::new_v4();
        entries.push(RouterEntry {
            id,
            handler,
            agent_id,
        });
        debug!(pattern, id = %id, "subscription registered");
        id
    }

    /// Remove a subscription by `(pattern, handler identity)`.
    pub fn unsubscribe(&self, pattern: &str, handler: &SharedHandler) -> bool {
        let (map, key) = self.slot(pattern);
        let identity = handler_identity(handler);
        let removed = match map.get_mut(&key) {
            Some(mut entries) => {
                let before = entries.len();
                entries.retain(|e| handler_identity(&e.handler) != identity);
                before != entries.len()
            }
            None => false,
        };
        if !removed {
            debug!(pattern, "unsubscribe for unknown handler");
        }
        removed
    }

    /// Remove a subscription by id. Returns `false` if unknown.
    pub fn unsubscribe_id(&self, id: SubscriptionId) -> bool {
        for map in [&self.exact, &self.wildcard] {
            for mut entries in map.iter_mut() {
                let before = entries.len();
                entries.retain(|e| e.id != id);
                if before != entries.len() {
                    return true;
                }
            }
        }
        debug!(%id, "unsubscribe for unknown subscription id");
        false
    }

    /// Drop every subscription owned by the given agent. Returns the number
    /// removed.
    pub fn remove_agent(&self, agent_id: &str) -> usize {
        let mut removed = 0;
        for map in [&self.exact, &self.wildcard] {
            for mut entries in map.iter_mut() {
                let before = entries.len();
                entries.retain(|e| e.agent_id.as_deref() != Some(agent_id));
                removed += before - entries.len();
            }
        }
        removed
    }

    /// Snapshot the subscriptions matching a topic. The returned list is
    /// stable: a concurrent unsubscribe cannot invalidate handlers already
    /// collected for this emission.
    pub fn matches(&self, topic: &str, include_wildcards: bool) -> Vec<RouterEntry> {
        let mut out: Vec<RouterEntry> = self
            .exact
            .get(topic)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        if include_wildcards {
            // Walk the strict dot-prefixes: `a.b.*` matches `a.b.c` but not
            // `a.b` itself.
            for (i, b) in topic.bytes().enumerate() {
                if b == b'.' {
                    if let Some(entries) = self.wildcard.get(&topic[..i]) {
                        out.extend(entries.iter().cloned());
                    }
                }
            }
        }
        out
    }

    /// Invoke a prepared set of deliveries concurrently and wait for all of
    /// them. Handler panics are logged and suppressed; a `false` return is
    /// recorded as a soft failure. Returns the number of handlers invoked.
    pub async fn dispatch(&self, deliveries: Vec<Delivery>) -> usize {
        let count = deliveries.len();
        let mut set = JoinSet::new();
        for d in deliveries {
            set.spawn(async move {
                let ok = d.handler.handle(&d.sender, &d.topic, &d.payload).await;
                (d.topic, ok)
            });
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, true)) => {}
                Ok((topic, false)) => {
                    self.counters.soft_failures.fetch_add(1, Ordering::Relaxed);
                    debug!(topic, "handler reported soft failure");
                }
                Err(e) => {
                    self.counters
                        .suppressed_panics
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "handler panicked during dispatch; suppressed");
                }
            }
        }
        self.counters.events_emitted.fetch_add(1, Ordering::Relaxed);
        self.counters
            .handlers_invoked
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Emit to exact-topic subscribers only.
    pub async fn emit(&self, topic: &str, payload: Payload, source: &str) -> usize {
        let entries = self.matches(topic, false);
        self.dispatch(Self::deliveries(entries, topic, payload, source))
            .await
    }

    /// Emit to exact-topic subscribers plus any `prefix.*` subscribers whose
    /// prefix is a strict dot-prefix of the topic.
    pub async fn emit_wildcardable(&self, topic: &str, payload: Payload, source: &str) -> usize {
        let entries = self.matches(topic, true);
        self.dispatch(Self::deliveries(entries, topic, payload, source))
            .await
    }

    fn deliveries(
        entries: Vec<RouterEntry>,
        topic: &str,
        payload: Payload,
        source: &str,
    ) -> Vec<Delivery> {
        entries
            .into_iter()
            .map(|e| Delivery {
                handler: e.handler,
                sender: source.to_string(),
                topic: topic.to_string(),
                payload: payload.clone(),
            })
            .collect()
    }

    pub fn metrics(&self) -> RouterMetrics {
        RouterMetrics {
            events_emitted: self.counters.events_emitted.load(Ordering::Relaxed),
            handlers_invoked: self.counters.handlers_invoked.load(Ordering::Relaxed),
            soft_failures: self.counters.soft_failures.load(Ordering::Relaxed),
            suppressed_panics: self.counters.suppressed_panics.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, pattern: &str) -> (&DashMap<String, Vec<RouterEntry>>, String) {
        match pattern.strip_suffix(".*") {
            Some(prefix) => (&self.wildcard, prefix.to_string()),
            None => (&self.exact, pattern.to_string()),
        }
    }
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::new()
    }
}
