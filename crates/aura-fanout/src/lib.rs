//! # aura-fanout
//!
//! The parallel handler-parameter engine. A payload carrying a
//! `handlers` map `{parameter → topic}` is fanned out into one concurrent
//! sub-emission per entry; each branch's result is captured from the
//! `<topic>.result` convention through a transient subscription; results are
//! re-aggregated into an enhanced payload and emitted as `<topic>.enhanced`
//! plus a backward-compatible completion on the original topic.

pub mod engine;
pub mod result;
pub mod spec;
pub mod telemetry;

pub use engine::{ParallelEngine, ENGINE_SOURCE};
pub use result::{BranchOutcome, ParallelResult, ParallelStatus};
pub use spec::{HandlerBinding, HandlerSpec};
pub use telemetry::{ExecutionRecord, TelemetrySnapshot};
