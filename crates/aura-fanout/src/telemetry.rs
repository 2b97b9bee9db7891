use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Retained execution records. Oldest entries are dropped past this bound.
const RECORD_RETENTION: usize = 1000;

/// One completed parallel execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub topic: String,
    pub handler_count: usize,
    pub execution_ms: u64,
    pub success: bool,
    pub performance_improvement: f64,
    pub at: DateTime<Utc>,
}

/// Aggregate counters plus bounded per-execution retention.
#[derive(Default)]
pub struct EngineTelemetry {
    executions: AtomicU64,
    branches: AtomicU64,
    branch_timeouts: AtomicU64,
    branch_failures: AtomicU64,
    validation_failures: AtomicU64,
    records: Mutex<VecDeque<ExecutionRecord>>,
}

/// Point-in-time serializable view, emitted as `parallel.system.metrics`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub executions: u64,
    pub branches: u64,
    pub branch_timeouts: u64,
    pub branch_failures: u64,
    pub validation_failures: u64,
}

impl EngineTelemetry {
    pub fn record_execution(&self, record: ExecutionRecord) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        self.branches
            .fetch_add(record.handler_count as u64, Ordering::Relaxed);
        let mut records = self.records.lock();
        if records.len() == RECORD_RETENTION {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn record_branch_timeout(&self) {
        self.branch_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_branch_failure(&self) {
        self.branch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            executions: self.executions.load(Ordering::Relaxed),
            branches: self.branches.load(Ordering::Relaxed),
            branch_timeouts: self.branch_timeouts.load(Ordering::Relaxed),
            branch_failures: self.branch_failures.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
        }
    }

    /// Most recent executions, newest last.
    pub fn recent(&self, limit: usize) -> Vec<ExecutionRecord> {
        let records = self.records.lock();
        records
            .iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }
}
