use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use aura_config::StreamConfig;
use aura_core::{AuraError, Event, Result};

use crate::pathway::{Pathway, INITIAL_WEIGHT};

pub type StreamId = Uuid;

/// Interval within which a re-arriving event is treated as a replay.
const DEDUP_WINDOW: Duration = Duration::from_millis(10);
/// Cadence of the coherence monitor and plasticity ticks.
const MONITOR_INTERVAL: Duration = Duration::from_millis(15);

/// Point-in-time stream health, published by the owning consumer task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSnapshot {
    pub stream_id: StreamId,
    pub peer_id: String,
    /// Health score in [0, 1]: nudged up by in-budget processing, down by
    /// rejections.
    pub coherence: f64,
    /// Rolling average end-to-end latency in microseconds (10% weight on
    /// each new sample).
    pub avg_latency_us: f64,
    pub events_processed: u64,
    pub events_rejected: u64,
    /// Current pathway weight.
    pub weight: f64,
}

/// Handle to an established stream. The stream's state lives inside its
/// consumer task; this handle only enqueues events and reads snapshots.
pub struct EventStream {
    pub id: StreamId,
    pub peer_id: String,
    config: StreamConfig,
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
    snapshot: Arc<RwLock<StreamSnapshot>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventStream {
    /// Allocate the bounded channel and spawn the owning consumer task.
    pub fn open(
        id: StreamId,
        peer_id: impl Into<String>,
        config: StreamConfig,
        peer_inbox: Option<mpsc::Sender<Event>>,
        cancel: CancellationToken,
    ) -> Self {
        let peer_id = peer_id.into();
        let (tx, rx) = mpsc::channel(config.buffer_size);
        let snapshot = Arc::new(RwLock::new(StreamSnapshot {
            stream_id: id,
            peer_id: peer_id.clone(),
            coherence: 0.5,
            avg_latency_us: 0.0,
            events_processed: 0,
            events_rejected: 0,
            weight: INITIAL_WEIGHT,
        }));
        let worker = StreamWorker {
            id,
            rx,
            config: config.clone(),
            pathway: Pathway::new(peer_id.clone()),
            peer_inbox,
            snapshot: Arc::clone(&snapshot),
            dedup: RecentEvents::default(),
            coherence: 0.5,
            avg_latency_us: 0.0,
            events_processed: 0,
            events_rejected: 0,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());
        Self {
            id,
            peer_id,
            config,
            tx,
            cancel,
            snapshot,
            task: Mutex::new(Some(task)),
        }
    }

    /// Enqueue an event. Returns acceptance, not confirmation of remote
    /// processing. Blocks (cooperatively) while the bounded channel is full;
    /// a fired cancellation token yields a typed cancellation failure
    /// without enqueueing.
    pub async fn send(&self, event: Event, cancel: &CancellationToken) -> Result<()> {
        // Events that are already stale would only be dropped by the
        // consumer; reject them at the door.
        if event.age() > self.config.max_latency() {
            return Err(AuraError::EventRejected(format!(
                "event on {:?} older than max latency",
                event.topic
            )));
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AuraError::Cancelled("stream send".into())),
            sent = self.tx.send(event) => {
                sent.map_err(|_| AuraError::StreamClosed(self.id.to_string()))
            }
        }
    }

    /// Non-blocking enqueue used when fanning a broadcast into many streams:
    /// a full or stale channel drops the event instead of stalling the
    /// caller. Returns whether the event was accepted.
    pub(crate) fn try_send(&self, event: Event) -> bool {
        if event.age() > self.config.max_latency() {
            return false;
        }
        self.tx.try_send(event).is_ok()
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        self.snapshot.read().clone()
    }

    pub(crate) fn snapshot_cell(&self) -> Arc<RwLock<StreamSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    /// Cancel the consumer, close the writer, and wait for the drain.
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if task.await.is_err() {
                warn!(stream_id = %self.id, "stream consumer task died before close");
            }
        }
    }
}

/// The owning consumer: all mutable stream state is funneled through this
/// task, so no lock is ever held across an await.
struct StreamWorker {
    id: StreamId,
    rx: mpsc::Receiver<Event>,
    config: StreamConfig,
    pathway: Pathway,
    peer_inbox: Option<mpsc::Sender<Event>>,
    snapshot: Arc<RwLock<StreamSnapshot>>,
    dedup: RecentEvents,
    coherence: f64,
    avg_latency_us: f64,
    events_processed: u64,
    events_rejected: u64,
    cancel: CancellationToken,
}

impl StreamWorker {
    async fn run(mut self) {
        let mut plasticity = tokio::time::interval(MONITOR_INTERVAL);
        plasticity.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut monitor = tokio::time::interval(MONITOR_INTERVAL);
        monitor.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = self.rx.recv() => match received {
                    Some(event) => self.consume(event).await,
                    None => break,
                },
                _ = plasticity.tick(), if self.config.plasticity_enabled => {
                    self.pathway.plasticity_tick();
                    self.publish();
                }
                _ = monitor.tick() => {
                    trace!(
                        stream_id = %self.id,
                        coherence = self.coherence,
                        avg_latency_us = self.avg_latency_us,
                        events_processed = self.events_processed,
                        weight = self.pathway.weight(),
                        "stream coherence monitor"
                    );
                    self.publish();
                }
            }
        }

        // Disposal: drop whatever is still queued without processing it.
        self.rx.close();
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        if drained > 0 {
            debug!(stream_id = %self.id, drained, "stream closed with queued events");
        }
        self.publish();
    }

    async fn consume(&mut self, event: Event) {
        // Replay within the dedup window: already processed.
        if self.dedup.is_replay(&event) {
            debug!(stream_id = %self.id, topic = %event.topic, "replay dropped");
            self.reject();
            return;
        }
        // Latency validity: events older than the budget are coherence
        // violations.
        if event.age() > self.config.max_latency() {
            debug!(
                stream_id = %self.id,
                topic = %event.topic,
                age_us = event.age().as_micros() as u64,
                "stale event dropped"
            );
            self.reject();
            return;
        }

        if self.config.biological_pacing {
            let delay_ms = rand::thread_rng().gen_range(1..=4);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        if self.config.plasticity_enabled {
            self.pathway.activate(Some(event.timestamp_ns));
        } else {
            self.pathway.observe(Some(event.timestamp_ns));
        }

        let latency_us = event.age().as_micros() as f64;
        self.avg_latency_us = if self.events_processed == 0 {
            latency_us
        } else {
            self.avg_latency_us * 0.9 + latency_us * 0.1
        };
        self.events_processed += 1;
        self.coherence = (self.coherence + 0.01).clamp(0.0, 1.0);

        if let Some(inbox) = &self.peer_inbox {
            // The consumer never blocks on a slow peer; a full inbox drops
            // the event for that peer only.
            if inbox.try_send(event).is_err() {
                debug!(stream_id = %self.id, "peer inbox full; delivery dropped");
            }
        }
        self.publish();
    }

    fn reject(&mut self) {
        self.events_rejected += 1;
        self.coherence = (self.coherence - 0.05).clamp(0.0, 1.0);
        self.publish();
    }

    fn publish(&self) {
        let mut snapshot = self.snapshot.write();
        snapshot.coherence = self.coherence;
        snapshot.avg_latency_us = self.avg_latency_us;
        snapshot.events_processed = self.events_processed;
        snapshot.events_rejected = self.events_rejected;
        snapshot.weight = self.pathway.weight();
    }
}

/// Temporal deduplication: an identical `(topic, timestamp)` pair
/// re-arriving within [`DEDUP_WINDOW`] is a replay.
#[derive(Default)]
struct RecentEvents {
    seen: HashMap<(String, u64), Instant>,
}

impl RecentEvents {
    fn is_replay(&mut self, event: &Event) -> bool {
        let now = Instant::now();
        self.seen
            .retain(|_, at| now.duration_since(*at) <= DEDUP_WINDOW);
        let key = (event.topic.clone(), event.timestamp_ns);
        if self.seen.contains_key(&key) {
            true
        } else {
            self.seen.insert(key, now);
            false
        }
    }
}
