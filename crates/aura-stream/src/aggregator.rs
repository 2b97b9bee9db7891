use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use aura_core::{into_payload, EventSource};

use crate::stream::{StreamId, StreamSnapshot};

/// Cadence of the network-wide aggregation tick.
const AGGREGATION_INTERVAL: Duration = Duration::from_millis(25);

/// Snapshot cells of every active stream, shared between the coordinator
/// (attach/detach) and the aggregator (reads). The aggregator only ever
/// reads published snapshots; it never touches a stream's own state.
#[derive(Default)]
pub struct StreamRegistry {
    cells: DashMap<StreamId, Arc<RwLock<StreamSnapshot>>>,
}

impl StreamRegistry {
    pub fn attach(&self, id: StreamId, cell: Arc<RwLock<StreamSnapshot>>) {
        self.cells.insert(id, cell);
    }

    pub fn detach(&self, id: StreamId) {
        self.cells.remove(&id);
    }

    pub fn snapshots(&self) -> Vec<StreamSnapshot> {
        self.cells.iter().map(|c| c.read().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Network-wide aggregate across all active streams.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
    pub active_streams: usize,
    /// Mean coherence across active streams.
    pub global_coherence: f64,
    /// Derived aggregate in [0, 1]; see [`compute_metrics`].
    pub emergent_intelligence: f64,
    pub avg_latency_us: f64,
    pub total_events_processed: u64,
}

/// `0.7·coherence + 0.2·(log10(N+1)/log10(10)) + 0.1 sub-millisecond bonus`,
/// clamped to [0, 1].
pub fn compute_metrics(snapshots: &[StreamSnapshot]) -> NetworkMetrics {
    let n = snapshots.len();
    if n == 0 {
        return NetworkMetrics {
            active_streams: 0,
            global_coherence: 0.0,
            emergent_intelligence: 0.0,
            avg_latency_us: 0.0,
            total_events_processed: 0,
        };
    }
    let global_coherence = snapshots.iter().map(|s| s.coherence).sum::<f64>() / n as f64;
    let avg_latency_us = snapshots.iter().map(|s| s.avg_latency_us).sum::<f64>() / n as f64;
    let total_events_processed = snapshots.iter().map(|s| s.events_processed).sum();

    let scale = ((n + 1) as f64).log10() / 10f64.log10();
    let latency_bonus = if avg_latency_us < 1_000.0 { 0.1 } else { 0.0 };
    let emergent_intelligence =
        (0.7 * global_coherence + 0.2 * scale + latency_bonus).clamp(0.0, 1.0);

    NetworkMetrics {
        active_streams: n,
        global_coherence,
        emergent_intelligence,
        avg_latency_us,
        total_events_processed,
    }
}

/// Singleton monitor emitting `network.metrics` for all active streams.
pub struct NetworkAggregator {
    latest: Arc<RwLock<Option<NetworkMetrics>>>,
}

impl NetworkAggregator {
    /// Spawn the aggregation loop. It stops when the token fires.
    pub fn spawn(
        source: Arc<dyn EventSource>,
        registry: Arc<StreamRegistry>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let latest: Arc<RwLock<Option<NetworkMetrics>>> = Arc::new(RwLock::new(None));
        let cell = Arc::clone(&latest);
        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(AGGREGATION_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {}
                }
                let snapshots = registry.snapshots();
                if snapshots.is_empty() {
                    continue;
                }
                let metrics = compute_metrics(&snapshots);
                trace!(
                    active_streams = metrics.active_streams,
                    global_coherence = metrics.global_coherence,
                    emergent_intelligence = metrics.emergent_intelligence,
                    "network aggregation tick"
                );
                let payload = into_payload(json!({
                    "activeStreams": metrics.active_streams,
                    "globalCoherence": metrics.global_coherence,
                    "emergentIntelligence": metrics.emergent_intelligence,
                    "avgLatencyUs": metrics.avg_latency_us,
                    "totalEventsProcessed": metrics.total_events_processed,
                }));
                *cell.write() = Some(metrics);
                source.emit("network.metrics", payload, "network.aggregator").await;
            }
        });
        (Self { latest }, task)
    }

    /// The most recently computed aggregate, if any tick has run with
    /// active streams.
    pub fn latest(&self) -> Option<NetworkMetrics> {
        self.latest.read().clone()
    }
}
