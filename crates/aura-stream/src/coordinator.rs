use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use aura_config::StreamConfig;
use aura_core::{into_payload, AuraError, Event, EventSource, Result};

use crate::aggregator::{NetworkAggregator, NetworkMetrics, StreamRegistry};
use crate::stream::{EventStream, StreamId, StreamSnapshot};

/// Source string stamped on coordinator-emitted events.
const COORDINATOR_SOURCE: &str = "peer.coordinator";

/// Per-peer inbox capacity.
const PEER_INBOX_CAPACITY: usize = 256;

/// A peer known to the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub id: String,
    pub agent_id: String,
    pub capabilities: Vec<String>,
    pub connected: bool,
}

struct Peer {
    info: PeerInfo,
    inbox_tx: mpsc::Sender<Event>,
}

/// Successful stream establishment.
#[derive(Debug, Clone)]
pub struct StreamEstablishment {
    pub stream_id: StreamId,
    pub establishment_latency: Duration,
}

/// Owns the peer table and every established stream, and runs the network
/// aggregator. One coordinator is constructed per runtime and injected where
/// needed; there is no process-wide registry.
pub struct PeerCoordinator {
    source: Arc<dyn EventSource>,
    peers: DashMap<String, Peer>,
    streams: DashMap<StreamId, Arc<EventStream>>,
    registry: Arc<StreamRegistry>,
    aggregator: NetworkAggregator,
    aggregator_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    broadcast_subscription: parking_lot::Mutex<Option<aura_core::SubscriptionId>>,
    cancel: CancellationToken,
}

impl PeerCoordinator {
    pub fn new(source: Arc<dyn EventSource>) -> Arc<Self> {
        let registry = Arc::new(StreamRegistry::default());
        let cancel = CancellationToken::new();
        let (aggregator, aggregator_task) = NetworkAggregator::spawn(
            Arc::clone(&source),
            Arc::clone(&registry),
            cancel.child_token(),
        );
        let coordinator = Arc::new(Self {
            source,
            peers: DashMap::new(),
            streams: DashMap::new(),
            registry,
            aggregator,
            aggregator_task: parking_lot::Mutex::new(Some(aggregator_task)),
            broadcast_subscription: parking_lot::Mutex::new(None),
            cancel,
        });

        // The coordinator is itself a subscriber: bus-wide consciousness
        // events fan into every active stream.
        let weak = Arc::downgrade(&coordinator);
        let handler = aura_core::handler_fn(move |sender, topic, payload| {
            let weak = weak.clone();
            async move {
                let Some(coordinator) = weak.upgrade() else {
                    return false;
                };
                coordinator.fan_into_streams(Event::new(topic, payload, sender));
                true
            }
        });
        let registrar = Arc::clone(&coordinator);
        tokio::spawn(async move {
            let id = registrar
                .source
                .subscribe("consciousness.event", handler)
                .await;
            *registrar.broadcast_subscription.lock() = Some(id);
        });

        coordinator
    }

    /// Offer a broadcast event to every active stream without blocking; a
    /// full stream simply misses it.
    fn fan_into_streams(&self, event: Event) {
        let streams: Vec<Arc<EventStream>> =
            self.streams.iter().map(|s| Arc::clone(&s)).collect();
        for stream in streams {
            if !stream.try_send(event.clone()) {
                debug!(stream_id = %stream.id, topic = %event.topic, "broadcast dropped");
            }
        }
    }

    // ── Peers ──────────────────────────────────────────────────

    /// Register a peer for an agent. Returns the peer id and the receiving
    /// end of the peer's inbox, through which stream-delivered events
    /// arrive.
    pub fn register_peer(
        &self,
        agent_id: impl Into<String>,
        capabilities: Vec<String>,
    ) -> (String, mpsc::Receiver<Event>) {
        let agent_id = agent_id.into();
        let id = format!("peer-{}", &Uuid::new_v4().simple().to_string()[..8]);
        let (inbox_tx, inbox_rx) = mpsc::channel(PEER_INBOX_CAPACITY);
        info!(peer_id = %id, agent_id = %agent_id, ?capabilities, "peer registered");
        self.peers.insert(
            id.clone(),
            Peer {
                info: PeerInfo {
                    id: id.clone(),
                    agent_id,
                    capabilities,
                    connected: true,
                },
                inbox_tx,
            },
        );
        (id, inbox_rx)
    }

    /// Mark a peer disconnected and close every stream targeting it.
    pub async fn disconnect_peer(&self, peer_id: &str) -> bool {
        let Some(mut peer) = self.peers.get_mut(peer_id) else {
            debug!(peer_id, "disconnect for unknown peer");
            return false;
        };
        peer.info.connected = false;
        drop(peer);

        let targeting: Vec<StreamId> = self
            .streams
            .iter()
            .filter(|s| s.peer_id == peer_id)
            .map(|s| s.id)
            .collect();
        for stream_id in targeting {
            self.close_stream(stream_id).await;
        }
        info!(peer_id, "peer disconnected");
        true
    }

    pub fn peer(&self, peer_id: &str) -> Option<PeerInfo> {
        self.peers.get(peer_id).map(|p| p.info.clone())
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.peers.iter().map(|p| p.info.clone()).collect()
    }

    // ── Streams ────────────────────────────────────────────────

    /// Open a stream to a peer: pathway warm-up, handshake within the
    /// establishment budget, channel allocation, aggregator integration.
    /// A typed failure leaves no resources behind.
    pub async fn establish_stream(
        &self,
        peer_id: &str,
        config: StreamConfig,
    ) -> Result<StreamEstablishment> {
        let started = Instant::now();
        let inbox = {
            let peer = self
                .peers
                .get(peer_id)
                .ok_or_else(|| AuraError::PeerNotFound(peer_id.to_string()))?;
            if !peer.info.connected {
                return Err(AuraError::PeerNotConnected(peer_id.to_string()));
            }
            for capability in &config.required_capabilities {
                if !peer.info.capabilities.contains(capability) {
                    return Err(AuraError::MissingCapability {
                        peer: peer_id.to_string(),
                        capability: capability.clone(),
                    });
                }
            }
            peer.inbox_tx.clone()
        };

        // Simulated pathway warm-up before the handshake.
        if config.biological_pacing {
            let warmup_ms = rand::thread_rng().gen_range(5..=10);
            tokio::time::sleep(Duration::from_millis(warmup_ms)).await;
        }

        let stream_id = Uuid::new_v4();
        self.source
            .emit(
                "consciousness.handshake",
                into_payload(json!({
                    "streamId": stream_id,
                    "targetPeer": peer_id,
                    "timestamp": Utc::now().to_rfc3339(),
                })),
                COORDINATOR_SOURCE,
            )
            .await;

        // Success is the handshake landing inside the establishment budget;
        // there is no reply schema.
        let budget = config.establishment_budget();
        let elapsed = started.elapsed();
        if elapsed > budget {
            return Err(AuraError::HandshakeTimeout {
                peer: peer_id.to_string(),
                budget_ms: budget.as_millis() as u64,
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }

        let stream = Arc::new(EventStream::open(
            stream_id,
            peer_id,
            config,
            Some(inbox),
            self.cancel.child_token(),
        ));
        self.registry.attach(stream_id, stream.snapshot_cell());
        self.streams.insert(stream_id, stream);

        let establishment_latency = started.elapsed();
        info!(
            %stream_id,
            peer_id,
            latency_ms = establishment_latency.as_millis() as u64,
            "stream established"
        );
        Ok(StreamEstablishment {
            stream_id,
            establishment_latency,
        })
    }

    /// Enqueue an event onto a stream. Blocks under back-pressure; a fired
    /// cancellation token returns a typed failure without enqueueing.
    pub async fn send_event(
        &self,
        stream_id: StreamId,
        event: Event,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let stream = self
            .streams
            .get(&stream_id)
            .map(|s| Arc::clone(&s))
            .ok_or_else(|| AuraError::StreamNotFound(stream_id.to_string()))?;
        stream.send(event, cancel).await
    }

    pub fn stream_snapshot(&self, stream_id: StreamId) -> Option<StreamSnapshot> {
        self.streams.get(&stream_id).map(|s| s.snapshot())
    }

    pub fn stream_snapshots(&self) -> Vec<StreamSnapshot> {
        self.registry.snapshots()
    }

    /// Latest network-wide aggregate, if the aggregator has ticked with
    /// active streams.
    pub fn network_metrics(&self) -> Option<NetworkMetrics> {
        self.aggregator.latest()
    }

    /// Close one stream: cancel its consumer, drain, detach from the
    /// aggregator.
    pub async fn close_stream(&self, stream_id: StreamId) -> bool {
        let Some((_, stream)) = self.streams.remove(&stream_id) else {
            debug!(%stream_id, "close for unknown stream");
            return false;
        };
        self.registry.detach(stream_id);
        stream.close().await;
        info!(%stream_id, "stream closed");
        true
    }

    /// Stop everything: all stream consumers, then the aggregator.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let subscription = self.broadcast_subscription.lock().take();
        if let Some(id) = subscription {
            self.source.unsubscribe(id).await;
        }
        let ids: Vec<StreamId> = self.streams.iter().map(|s| s.id).collect();
        for stream_id in ids {
            self.close_stream(stream_id).await;
        }
        let task = self.aggregator_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.peers.clear();
        info!("peer coordinator shut down");
    }
}
