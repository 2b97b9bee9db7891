//! # aura-config
//!
//! Configuration schema (serde + toml) and loader for the Aura runtime.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{AggregationMode, AuraConfig, LoggingConfig, ParallelConfig, StreamConfig};
