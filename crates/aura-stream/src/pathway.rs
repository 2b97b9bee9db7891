use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

pub const MIN_WEIGHT: f64 = 0.1;
pub const MAX_WEIGHT: f64 = 1.0;
pub const INITIAL_WEIGHT: f64 = 0.5;

/// Activations retained for the rate window.
const RING_CAPACITY: usize = 100;
/// Consecutive activations inside this window strengthen the pathway.
const POTENTIATION_WINDOW: Duration = Duration::from_millis(20);
/// A gap longer than this weakens it.
const DEPRESSION_THRESHOLD: Duration = Duration::from_millis(100);

/// Which adaptation rule an activation triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationKind {
    Potentiated,
    Depressed,
    Steady,
}

/// One recorded activation.
#[derive(Debug, Clone)]
pub struct PathwayActivation {
    pub at: Instant,
    pub kind: ActivationKind,
    /// Pathway weight after this activation.
    pub strength: f64,
    /// Identity of the triggering event (its monotonic timestamp), if any.
    pub event_id: Option<u64>,
}

/// Adaptive per-peer pathway weight.
///
/// The weight is a smoothed measure of how hot the connection to one target
/// peer is: rapid successive activations push it up, long gaps pull it down,
/// and a periodic tick drifts it toward the recent activity level. The
/// weight is clamped between [`MIN_WEIGHT`] and [`MAX_WEIGHT`]; every
/// pathway has exactly one target peer.
#[derive(Debug)]
pub struct Pathway {
    target_peer: String,
    weight: f64,
    last_activation: Option<Instant>,
    recent: VecDeque<PathwayActivation>,
}

impl Pathway {
    pub fn new(target_peer: impl Into<String>) -> Self {
        Self {
            target_peer: target_peer.into(),
            weight: INITIAL_WEIGHT,
            last_activation: None,
            recent: VecDeque::with_capacity(RING_CAPACITY),
        }
    }

    pub fn target_peer(&self) -> &str {
        &self.target_peer
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Process one event through the pathway, applying the interval rules.
    pub fn activate(&mut self, event_id: Option<u64>) -> ActivationKind {
        let now = Instant::now();
        let kind = match self.last_activation {
            Some(last) => {
                let interval = now.duration_since(last);
                if interval < POTENTIATION_WINDOW {
                    self.weight += 0.05;
                    ActivationKind::Potentiated
                } else if interval > DEPRESSION_THRESHOLD {
                    self.weight -= 0.02;
                    ActivationKind::Depressed
                } else {
                    ActivationKind::Steady
                }
            }
            None => ActivationKind::Steady,
        };
        self.weight = self.weight.clamp(MIN_WEIGHT, MAX_WEIGHT);
        self.record(now, kind, event_id);
        kind
    }

    /// Record an activation without adapting the weight (plasticity
    /// disabled).
    pub fn observe(&mut self, event_id: Option<u64>) {
        self.record(Instant::now(), ActivationKind::Steady, event_id);
    }

    /// Periodic drift: ±0.01 depending on activity over the last second
    /// (>10/s up, <2/s down).
    pub fn plasticity_tick(&mut self) {
        let rate = match Instant::now().checked_sub(Duration::from_secs(1)) {
            Some(cutoff) => self
                .recent
                .iter()
                .rev()
                .take_while(|a| a.at > cutoff)
                .count(),
            None => self.recent.len(),
        };
        if rate > 10 {
            self.weight += 0.01;
        } else if rate < 2 {
            self.weight -= 0.01;
        }
        self.weight = self.weight.clamp(MIN_WEIGHT, MAX_WEIGHT);
    }

    pub fn recent_activations(&self) -> &VecDeque<PathwayActivation> {
        &self.recent
    }

    fn record(&mut self, at: Instant, kind: ActivationKind, event_id: Option<u64>) {
        if self.recent.len() == RING_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(PathwayActivation {
            at,
            kind,
            strength: self.weight,
            event_id,
        });
        self.last_activation = Some(at);
    }
}
