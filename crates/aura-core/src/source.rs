use async_trait::async_trait;

use crate::event::Payload;
use crate::handler::{SharedHandler, SubscriptionId};

/// The narrow emission interface the fan-out engine and peering layer depend
/// on. The bus implements it; consumers never see the bus type itself, which
/// keeps the dependency graph acyclic.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Emit an event. Returns the number of handlers invoked (best effort;
    /// per-handler errors are never re-raised).
    async fn emit(&self, topic: &str, payload: Payload, source: &str) -> usize;

    /// Register a source-owned handler under an exact topic or a `prefix.*`
    /// pattern. Idempotent with respect to `(pattern, handler identity)`.
    async fn subscribe(&self, pattern: &str, handler: SharedHandler) -> SubscriptionId;

    /// Remove a subscription by id. Returns `false` if unknown.
    async fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Hook consulted by the bus before normal dispatch of an emission.
///
/// Returning `true` consumes the emission: normal dispatch is skipped for
/// that call and the interceptor is responsible for any follow-up events.
#[async_trait]
pub trait EmitInterceptor: Send + Sync {
    async fn intercept(&self, topic: &str, payload: &Payload, source: &str) -> bool;
}
