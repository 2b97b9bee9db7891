//! # aura-cli
//!
//! Command-line interface for the Aura coordination runtime.
//!
//! ## Commands
//!
//! - `aura run` — Start the runtime and serve events
//! - `aura demo fanout` — Parallel fan-out/fan-in demonstration
//! - `aura demo stream` — Peer stream with adaptive weighting
//! - `aura config` — Show the resolved configuration

pub mod commands;

pub use commands::Cli;
