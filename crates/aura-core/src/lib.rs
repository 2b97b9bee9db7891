//! # aura-core
//!
//! Core types, traits, and primitives for the Aura coordination runtime.
//! This crate defines the shared vocabulary used by every other crate in the
//! workspace: events and payloads, the handler and event-source traits, the
//! unified error type, and small id/clock helpers.

pub mod error;
pub mod event;
pub mod handler;
pub mod source;
pub mod types;

pub use error::{AuraError, Result};
pub use event::{first_str, into_payload, monotonic_ns, Event, Payload};
pub use handler::{handler_fn, handler_identity, EventHandler, SharedHandler, SubscriptionId};
pub use source::{EmitInterceptor, EventSource};
pub use types::{short_id, DeliveryScope};
