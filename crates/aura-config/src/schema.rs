use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration — maps to `aura.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuraConfig {
    pub parallel: ParallelConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

// ── Parallel engine ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Maximum branches in flight per execution. If 0, auto-detected as
    /// 2 × logical cores.
    pub max_concurrent: usize,
    /// Per-branch result timeout in milliseconds.
    pub parameter_timeout_ms: u64,
    /// Carry the original payload into every branch payload.
    pub context_preservation: bool,
    /// Forward aggregated results onto established peer streams.
    pub stream_processing_enabled: bool,
    /// How branch results are folded back into a payload.
    pub result_aggregation_mode: AggregationMode,
    /// Emit performance telemetry events after each execution.
    pub performance_monitoring_enabled: bool,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 0,
            parameter_timeout_ms: 30_000,
            context_preservation: true,
            stream_processing_enabled: false,
            result_aggregation_mode: AggregationMode::Enhanced,
            performance_monitoring_enabled: true,
        }
    }
}

impl ParallelConfig {
    /// Concurrency bound with the 0 = auto default applied.
    pub fn effective_max_concurrent(&self) -> usize {
        if self.max_concurrent == 0 {
            2 * num_cpus::get()
        } else {
            self.max_concurrent
        }
    }

    pub fn parameter_timeout(&self) -> Duration {
        Duration::from_millis(self.parameter_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Summary event only.
    Simple,
    /// Full enhanced payload keyed by parameter name.
    Enhanced,
    /// Enhanced payload, additionally forwarded to peer streams.
    Stream,
}

// ── Peer streams ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Capabilities the target peer must advertise before a stream opens.
    pub required_capabilities: Vec<String>,
    /// Simulate biological pacing (1–4 ms per processed event).
    pub biological_pacing: bool,
    /// Maximum acceptable event age in microseconds; older events are
    /// dropped as coherence violations.
    pub max_latency_us: u64,
    /// Bounded stream channel capacity; senders block when full.
    pub buffer_size: usize,
    /// Enable the adaptive pathway weight updates.
    pub plasticity_enabled: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            required_capabilities: Vec::new(),
            biological_pacing: true,
            max_latency_us: 1_000,
            buffer_size: 1024,
            plasticity_enabled: true,
        }
    }
}

impl StreamConfig {
    pub fn max_latency(&self) -> Duration {
        Duration::from_micros(self.max_latency_us)
    }

    /// Overall stream-establishment budget: `max-latency × 100`.
    pub fn establishment_budget(&self) -> Duration {
        self.max_latency() * 100
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter, e.g. "info" or "aura_fanout=debug,info".
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl AuraConfig {
    /// Validate the configuration. Returns warnings; errors fail the load.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.parallel.parameter_timeout_ms == 0 {
            return Err("parallel.parameter_timeout_ms must be greater than 0".into());
        }
        if self.stream.buffer_size == 0 {
            return Err("stream.buffer_size must be greater than 0".into());
        }
        if self.stream.max_latency_us == 0 {
            return Err("stream.max_latency_us must be greater than 0".into());
        }
        if self.parallel.max_concurrent > 1024 {
            warnings.push(format!(
                "parallel.max_concurrent = {} is unusually high",
                self.parallel.max_concurrent
            ));
        }
        if self.parallel.parameter_timeout_ms < 100 {
            warnings.push(format!(
                "parallel.parameter_timeout_ms = {} may time out healthy branches",
                self.parallel.parameter_timeout_ms
            ));
        }
        Ok(warnings)
    }
}
