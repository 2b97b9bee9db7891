use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::event::Payload;

/// Identifier assigned to a subscription when a handler is registered.
pub type SubscriptionId = Uuid;

/// A callable invoked for a topic.
///
/// The returned boolean indicates non-fatal success: `false` is recorded as a
/// soft failure in dispatch metrics but is never propagated to the emitter.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, sender: &str, topic: &str, payload: &Payload) -> bool;
}

/// Shared, clonable handler reference. Handler identity (for subscribe
/// deduplication and unsubscribe-by-handler) is the identity of this `Arc`.
pub type SharedHandler = Arc<dyn EventHandler>;

/// Stable identity of a handler, derived from its `Arc` pointer.
pub fn handler_identity(handler: &SharedHandler) -> usize {
    Arc::as_ptr(handler) as *const () as usize
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(String, String, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    async fn handle(&self, sender: &str, topic: &str, payload: &Payload) -> bool {
        (self.f)(sender.to_string(), topic.to_string(), payload.clone()).await
    }
}

/// Wrap an async closure `(sender, topic, payload) -> bool` as a handler.
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(String, String, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(FnHandler { f })
}
