use thiserror::Error;

/// Unified error type for the entire Aura runtime.
#[derive(Error, Debug)]
pub enum AuraError {
    // ── Bus errors ─────────────────────────────────────────────
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("agent inactive: {0}")]
    AgentInactive(String),

    #[error("invalid topic pattern: {0}")]
    InvalidPattern(String),

    // ── Fan-out errors ─────────────────────────────────────────
    #[error("handler spec invalid: {0}")]
    HandlerSpec(String),

    #[error("parallel execution failed: {0}")]
    Execution(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    // ── Peering errors ─────────────────────────────────────────
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    #[error("peer not connected: {0}")]
    PeerNotConnected(String),

    #[error("peer {peer} missing required capability: {capability}")]
    MissingCapability { peer: String, capability: String },

    #[error("handshake with {peer} exceeded {budget_ms}ms budget (took {elapsed_ms}ms)")]
    HandshakeTimeout {
        peer: String,
        budget_ms: u64,
        elapsed_ms: u64,
    },

    #[error("stream not found: {0}")]
    StreamNotFound(String),

    #[error("stream closed: {0}")]
    StreamClosed(String),

    #[error("event rejected: {0}")]
    EventRejected(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AuraError>;
