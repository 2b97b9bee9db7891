use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use aura_config::{AggregationMode, ParallelConfig};
use aura_core::{handler_fn, into_payload, EmitInterceptor, EventSource, Payload};

use crate::result::{performance_improvement, BranchOutcome, ParallelResult, ParallelStatus};
use crate::spec::{HandlerBinding, HandlerSpec, HANDLER_KEYS};
use crate::telemetry::{EngineTelemetry, ExecutionRecord, TelemetrySnapshot};

/// Source string stamped on every event the engine emits. Emissions carrying
/// it are never re-intercepted.
pub const ENGINE_SOURCE: &str = "parallel.engine";

/// The parallel handler-parameter engine.
///
/// Converts one logical event carrying a handler-parameter map into N
/// concurrent sub-emissions, captures each branch's result from its
/// `<topic>.result` follow-up, and folds everything back into a single
/// enhanced payload emitted as `<topic>.enhanced`.
pub struct ParallelEngine {
    source: Arc<dyn EventSource>,
    config: ParallelConfig,
    semaphore: Arc<Semaphore>,
    telemetry: EngineTelemetry,
    cancel: CancellationToken,
}

impl ParallelEngine {
    pub fn new(source: Arc<dyn EventSource>, config: ParallelConfig) -> Arc<Self> {
        let semaphore = Arc::new(Semaphore::new(config.effective_max_concurrent()));
        Arc::new(Self {
            source,
            config,
            semaphore,
            telemetry: EngineTelemetry::default(),
            cancel: CancellationToken::new(),
        })
    }

    /// The emit interceptor to install on the bus. The bus sees only the
    /// [`EmitInterceptor`] trait; it never learns the engine type.
    pub fn interceptor(self: &Arc<Self>) -> Arc<dyn EmitInterceptor> {
        Arc::new(EngineInterceptor {
            engine: Arc::clone(self),
        })
    }

    /// Cancel all in-flight interceptor-spawned executions.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    pub fn recent_executions(&self, limit: usize) -> Vec<ExecutionRecord> {
        self.telemetry.recent(limit)
    }

    /// Run a fan-out for a payload carrying a handler-parameter map.
    ///
    /// Always returns a [`ParallelResult`]; never panics, never `Err`. A
    /// payload with no handler key, or an empty map, is a no-op success with
    /// zero branches and emits no `.enhanced` event.
    pub async fn execute(
        &self,
        topic: &str,
        payload: &Payload,
        cancel: &CancellationToken,
    ) -> ParallelResult {
        let Some(raw) = HandlerSpec::detect(payload) else {
            return ParallelResult::noop(topic);
        };
        let bindings = match HandlerSpec::parse(raw).and_then(|spec| spec.normalize()) {
            Ok(bindings) => bindings,
            Err(e) => {
                self.telemetry.record_validation_failure();
                warn!(topic, error = %e, "handler spec validation failed");
                self.source
                    .emit(
                        "parallel.execution.failed",
                        into_payload(json!({ "topic": topic, "error": e.to_string() })),
                        ENGINE_SOURCE,
                    )
                    .await;
                return ParallelResult::validation_failed(topic, e.to_string());
            }
        };
        if bindings.is_empty() {
            return ParallelResult::noop(topic);
        }

        self.source
            .emit(
                "parallel.handlers.registered",
                into_payload(json!({
                    "topic": topic,
                    "handlerCount": bindings.len(),
                    "parameters": parameter_names(&bindings),
                })),
                ENGINE_SOURCE,
            )
            .await;

        let started = Instant::now();
        let base = strip_handler_keys(payload);
        let branch_base = if self.config.context_preservation {
            base.clone()
        } else {
            Payload::new()
        };

        let mut set: JoinSet<BranchOutcome> = JoinSet::new();
        for binding in bindings.clone() {
            set.spawn(run_branch(
                Arc::clone(&self.source),
                Arc::clone(&self.semaphore),
                self.config.parameter_timeout(),
                cancel.clone(),
                binding,
                branch_base.clone(),
            ));
        }

        let mut outcomes = Vec::with_capacity(bindings.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(topic, error = %e, "branch task died; captured as failure"),
            }
        }
        // A branch task that died never produced its outcome; synthesize a
        // failure entry so the aggregate still has one entry per parameter.
        for binding in &bindings {
            if !outcomes.iter().any(|o| o.parameter_name == binding.parameter) {
                outcomes.push(BranchOutcome {
                    parameter_name: binding.parameter.clone(),
                    handler_event_name: binding.topic.clone(),
                    execution_ms: started.elapsed().as_millis() as u64,
                    success: false,
                    timed_out: false,
                    result: json!({ "error": "branch task failed", "handlerEventName": binding.topic }),
                });
            }
        }
        outcomes.sort_by_key(|o| {
            bindings
                .iter()
                .position(|b| b.parameter == o.parameter_name)
                .unwrap_or(usize::MAX)
        });
        for outcome in &outcomes {
            if outcome.timed_out {
                self.telemetry.record_branch_timeout();
            } else if !outcome.success {
                self.telemetry.record_branch_failure();
            }
        }

        let execution_ms = started.elapsed().as_millis() as u64;
        let improvement = performance_improvement(bindings.len(), execution_ms);

        if cancel.is_cancelled() {
            debug!(topic, "fan-out cancelled mid-flight");
            return ParallelResult {
                status: ParallelStatus::Cancelled,
                topic: topic.to_string(),
                branches: outcomes,
                execution_ms,
                performance_improvement: improvement,
            };
        }

        self.aggregate_and_emit(topic, &base, &outcomes, execution_ms, improvement)
            .await;

        self.telemetry.record_execution(ExecutionRecord {
            topic: topic.to_string(),
            handler_count: bindings.len(),
            execution_ms,
            success: outcomes.iter().all(|o| o.success),
            performance_improvement: improvement,
            at: Utc::now(),
        });

        ParallelResult {
            status: ParallelStatus::Success,
            topic: topic.to_string(),
            branches: outcomes,
            execution_ms,
            performance_improvement: improvement,
        }
    }

    /// Fold branch outcomes into the enhanced payload and emit the follow-up
    /// events.
    async fn aggregate_and_emit(
        &self,
        topic: &str,
        base: &Payload,
        outcomes: &[BranchOutcome],
        execution_ms: u64,
        improvement: f64,
    ) {
        let names: Vec<String> = outcomes.iter().map(|o| o.parameter_name.clone()).collect();

        if self.config.result_aggregation_mode != AggregationMode::Simple {
            let mut enhanced = base.clone();
            for outcome in outcomes {
                merge_branch(&mut enhanced, outcome);
            }
            enhanced.insert(
                "_parallelExecution".to_string(),
                json!({
                    "handlerCount": outcomes.len(),
                    "executionMode": "parallel",
                    "timestamp": Utc::now().to_rfc3339(),
                    "resultProperties": names,
                }),
            );

            self.source
                .emit(&format!("{topic}.enhanced"), enhanced.clone(), ENGINE_SOURCE)
                .await;
            self.source
                .emit(
                    "parallel.result.enhanced",
                    into_payload(json!({ "topic": topic, "resultProperties": names })),
                    ENGINE_SOURCE,
                )
                .await;
            if self.config.result_aggregation_mode == AggregationMode::Stream
                || self.config.stream_processing_enabled
            {
                self.source
                    .emit("consciousness.event", enhanced, ENGINE_SOURCE)
                    .await;
            }
        }

        // Backward-compatible completion on the original topic. It carries
        // no handler key, so it dispatches normally without re-interception.
        let all_ok = outcomes.iter().all(|o| o.success);
        self.source
            .emit(
                topic,
                into_payload(json!({
                    "result": format!("{} handler parameters executed in parallel", outcomes.len()),
                    "success": all_ok,
                    "executionTimeMs": execution_ms,
                    "parallelOptimized": true,
                    "performanceImprovement": improvement,
                })),
                ENGINE_SOURCE,
            )
            .await;

        if self.config.performance_monitoring_enabled {
            self.source
                .emit(
                    "parallel.performance.achievement",
                    into_payload(json!({
                        "topic": topic,
                        "handlerCount": outcomes.len(),
                        "executionTimeMs": execution_ms,
                        "performanceImprovement": improvement,
                    })),
                    ENGINE_SOURCE,
                )
                .await;
            if let Ok(snapshot) = serde_json::to_value(self.telemetry.snapshot()) {
                self.source
                    .emit("parallel.system.metrics", into_payload(snapshot), ENGINE_SOURCE)
                    .await;
            }
        }
    }
}

/// Execute one branch: transient result subscription, sub-emission, bounded
/// wait, guaranteed unsubscribe.
async fn run_branch(
    source: Arc<dyn EventSource>,
    semaphore: Arc<Semaphore>,
    timeout: Duration,
    cancel: CancellationToken,
    binding: HandlerBinding,
    base_payload: Payload,
) -> BranchOutcome {
    let started = Instant::now();
    let permit = tokio::select! {
        _ = cancel.cancelled() => return cancelled_outcome(&binding, started),
        permit = Arc::clone(&semaphore).acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return failure_outcome(&binding, started, "semaphore closed"),
        },
    };
    let _permit = permit;

    let execution_id = Uuid::new_v4();
    let (tx, rx) = oneshot::channel::<Payload>();
    let slot = Arc::new(Mutex::new(Some(tx)));
    let one_shot = {
        let slot = Arc::clone(&slot);
        handler_fn(move |_sender, _topic, payload| {
            let slot = Arc::clone(&slot);
            async move {
                if let Some(tx) = slot.lock().take() {
                    let _ = tx.send(payload);
                }
                true
            }
        })
    };
    let result_topic = format!("{}.result", binding.topic);
    let subscription = source.subscribe(&result_topic, one_shot).await;

    let mut payload = base_payload;
    payload.insert(
        "_parameterExecution".to_string(),
        json!({
            "parameterName": binding.parameter,
            "handlerEventName": binding.topic,
            "executionId": execution_id,
            "timestamp": Utc::now().to_rfc3339(),
        }),
    );
    source.emit(&binding.topic, payload, ENGINE_SOURCE).await;

    let outcome = tokio::select! {
        _ = cancel.cancelled() => cancelled_outcome(&binding, started),
        waited = tokio::time::timeout(timeout, rx) => match waited {
            Ok(Ok(result)) => {
                let success = !result.contains_key("error");
                BranchOutcome {
                    parameter_name: binding.parameter.clone(),
                    handler_event_name: binding.topic.clone(),
                    execution_ms: started.elapsed().as_millis() as u64,
                    success,
                    timed_out: false,
                    result: Value::Object(result),
                }
            }
            Ok(Err(_)) => failure_outcome(&binding, started, "result channel closed"),
            Err(_) => BranchOutcome {
                parameter_name: binding.parameter.clone(),
                handler_event_name: binding.topic.clone(),
                execution_ms: started.elapsed().as_millis() as u64,
                success: false,
                timed_out: true,
                result: json!({ "error": "timeout", "handlerEventName": binding.topic }),
            },
        },
    };

    // The transient handler is removed whatever the outcome was.
    source.unsubscribe(subscription).await;
    outcome
}

fn cancelled_outcome(binding: &HandlerBinding, started: Instant) -> BranchOutcome {
    BranchOutcome {
        parameter_name: binding.parameter.clone(),
        handler_event_name: binding.topic.clone(),
        execution_ms: started.elapsed().as_millis() as u64,
        success: false,
        timed_out: false,
        result: json!({ "error": "cancelled", "handlerEventName": binding.topic }),
    }
}

fn failure_outcome(binding: &HandlerBinding, started: Instant, reason: &str) -> BranchOutcome {
    BranchOutcome {
        parameter_name: binding.parameter.clone(),
        handler_event_name: binding.topic.clone(),
        execution_ms: started.elapsed().as_millis() as u64,
        success: false,
        timed_out: false,
        result: json!({ "error": reason, "handlerEventName": binding.topic }),
    }
}

/// Place a branch's details under its parameter key. A collision with an
/// original payload key becomes `[original, new]` when the serialized forms
/// differ; identical forms keep the existing value.
fn merge_branch(enhanced: &mut Payload, outcome: &BranchOutcome) {
    let key = outcome.parameter_name.clone();
    let details = outcome.details();
    let replacement = match enhanced.get(&key) {
        Some(existing) => {
            let same = serde_json::to_string(existing).ok() == serde_json::to_string(&details).ok();
            if same {
                None
            } else {
                Some(Value::Array(vec![existing.clone(), details]))
            }
        }
        None => Some(details),
    };
    if let Some(value) = replacement {
        enhanced.insert(key, value);
    }
}

fn strip_handler_keys(payload: &Payload) -> Payload {
    let mut base = payload.clone();
    for key in HANDLER_KEYS {
        base.remove(*key);
    }
    base
}

fn parameter_names(bindings: &[HandlerBinding]) -> Vec<String> {
    bindings.iter().map(|b| b.parameter.clone()).collect()
}

/// Installed on the bus; consumes emissions whose payloads carry a
/// handler-parameter map and runs the fan-out on a background task so the
/// original `emit` returns promptly.
struct EngineInterceptor {
    engine: Arc<ParallelEngine>,
}

#[async_trait]
impl EmitInterceptor for EngineInterceptor {
    async fn intercept(&self, topic: &str, payload: &Payload, source: &str) -> bool {
        if source == ENGINE_SOURCE {
            return false;
        }
        if topic.starts_with("parallel.")
            || topic.ends_with(".result")
            || topic.ends_with(".enhanced")
        {
            return false;
        }
        if HandlerSpec::detect(payload).is_none() {
            return false;
        }

        let engine = Arc::clone(&self.engine);
        let topic = topic.to_string();
        let payload = payload.clone();
        let cancel = engine.cancel.child_token();
        tokio::spawn(async move {
            let result = engine.execute(&topic, &payload, &cancel).await;
            debug!(
                topic = %result.topic,
                status = ?result.status,
                branches = result.branches.len(),
                "intercepted emission executed"
            );
        });
        true
    }
}
