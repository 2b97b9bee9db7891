use serde::Serialize;
use serde_json::Value;

/// Terminal state of one fan-out branch. Every branch completes exactly
/// once: with a result, with a handler-reported error shape, with a timeout,
/// or cancelled. No retries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchOutcome {
    pub parameter_name: String,
    pub handler_event_name: String,
    /// Wall-clock branch duration in milliseconds.
    pub execution_ms: u64,
    pub success: bool,
    pub timed_out: bool,
    /// The payload received on `<topic>.result`, or a structured error
    /// object (`{"error": …}`) for timeout/failure/cancellation.
    pub result: Value,
}

impl BranchOutcome {
    /// Result detail entry placed under the parameter key in the enhanced
    /// payload.
    pub fn details(&self) -> Value {
        serde_json::json!({
            "result": self.result,
            "executionMs": self.execution_ms,
            "success": self.success,
            "parameterName": self.parameter_name,
        })
    }
}

/// How a parallel execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelStatus {
    /// All branches settled (individual branches may still have failed or
    /// timed out; inspect the outcomes).
    Success,
    /// The handler-parameter map was malformed; nothing was emitted.
    ValidationFailed(String),
    /// Fan-out itself broke down (e.g. a branch task died).
    ExecutionFailed(String),
    /// The caller's cancellation token fired mid-flight.
    Cancelled,
}

/// What the engine hands back to its caller. Engine calls never panic and
/// never return `Err`; failures are encoded here.
#[derive(Debug, Clone, Serialize)]
pub struct ParallelResult {
    pub status: ParallelStatus,
    pub topic: String,
    pub branches: Vec<BranchOutcome>,
    /// Total wall-clock execution in milliseconds.
    pub execution_ms: u64,
    /// Telemetry-only estimate against a fixed sequential baseline,
    /// clamped to [0, 500].
    pub performance_improvement: f64,
}

impl ParallelResult {
    pub fn success(&self) -> bool {
        self.status == ParallelStatus::Success
    }

    /// A no-op success: nothing to fan out, zero branches.
    pub fn noop(topic: &str) -> Self {
        Self {
            status: ParallelStatus::Success,
            topic: topic.to_string(),
            branches: Vec::new(),
            execution_ms: 0,
            performance_improvement: 0.0,
        }
    }

    pub fn validation_failed(topic: &str, reason: String) -> Self {
        Self {
            status: ParallelStatus::ValidationFailed(reason),
            topic: topic.to_string(),
            branches: Vec::new(),
            execution_ms: 0,
            performance_improvement: 0.0,
        }
    }
}

/// `max(0, min(500, (estimated − actual) / estimated × 100))` with a fixed
/// one-second-per-handler sequential estimate. Reported, never optimized
/// against.
pub fn performance_improvement(handler_count: usize, actual_ms: u64) -> f64 {
    if handler_count == 0 {
        return 0.0;
    }
    let estimated_ms = (handler_count as f64) * 1000.0;
    let improvement = (estimated_ms - actual_ms as f64) / estimated_ms * 100.0;
    improvement.clamp(0.0, 500.0)
}
