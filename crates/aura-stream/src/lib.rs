//! # aura-stream
//!
//! The peering layer: bounded per-peer event streams with an owning
//! consumer task, adaptive pathway weighting, temporal deduplication, and a
//! network-wide aggregator. Peering here is an in-process simulation of
//! biologically-paced delivery, not a wire protocol.

pub mod aggregator;
pub mod coordinator;
pub mod pathway;
pub mod stream;

pub use aggregator::{compute_metrics, NetworkAggregator, NetworkMetrics, StreamRegistry};
pub use coordinator::{PeerCoordinator, PeerInfo, StreamEstablishment};
pub use pathway::{ActivationKind, Pathway, PathwayActivation, INITIAL_WEIGHT, MAX_WEIGHT, MIN_WEIGHT};
pub use stream::{EventStream, StreamId, StreamSnapshot};
