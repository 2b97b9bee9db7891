#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use aura_bus::AgentSpec;
    use aura_config::{AuraConfig, StreamConfig};
    use aura_core::{handler_fn, into_payload, Payload};
    use aura_runtime::Runtime;

    fn test_config() -> AuraConfig {
        let mut config = AuraConfig::default();
        config.parallel.parameter_timeout_ms = 2_000;
        config
    }

    // ── Assembly ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_start_registers_services() {
        let runtime = Runtime::start(test_config()).await.unwrap();
        let names: Vec<String> = runtime
            .bus()
            .agents()
            .into_iter()
            .map(|a| a.name)
            .collect();
        for expected in ["console-service", "file-service", "time-service"] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_removes_services() {
        let runtime = Runtime::start(test_config()).await.unwrap();
        let bus = Arc::clone(runtime.bus());
        runtime.shutdown().await;
        assert!(bus.agents().is_empty());
    }

    // ── End-to-end fan-out through the interceptor ─────────────

    #[tokio::test]
    async fn test_emit_with_handlers_produces_enhanced_event() {
        let runtime = Runtime::start(test_config()).await.unwrap();
        let bus = runtime.bus();

        let producers = bus.join_bus(AgentSpec::new("producers", "worker"));
        let producer_bus = Arc::clone(bus);
        bus.subscribe(
            &producers,
            "analysis.complete",
            handler_fn(move |_sender, _topic, _payload: Payload| {
                let bus = Arc::clone(&producer_bus);
                async move {
                    bus.emit(
                        "analysis.complete.result",
                        into_payload(json!({ "score": 0.9 })),
                    )
                    .await;
                    true
                }
            }),
        )
        .unwrap();

        let enhanced = Arc::new(parking_lot::Mutex::new(None::<Payload>));
        let enhanced_in_handler = Arc::clone(&enhanced);
        let watcher = bus.join_bus(AgentSpec::new("watcher", "observer"));
        bus.subscribe(
            &watcher,
            "work.start.enhanced",
            handler_fn(move |_sender, _topic, payload: Payload| {
                let cell = Arc::clone(&enhanced_in_handler);
                async move {
                    cell.lock().get_or_insert(payload);
                    true
                }
            }),
        )
        .unwrap();

        bus.emit(
            "work.start",
            into_payload(json!({
                "handlers": { "analysis": "analysis.complete" },
            })),
        )
        .await;

        let mut captured = None;
        for _ in 0..200 {
            if let Some(payload) = enhanced.lock().clone() {
                captured = Some(payload);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let captured = captured.expect("enhanced event within budget");
        assert_eq!(
            captured
                .get("analysis")
                .and_then(|v| v.pointer("/result/score"))
                .and_then(|v| v.as_f64()),
            Some(0.9)
        );

        runtime.shutdown().await;
    }

    // ── Peering through the assembled runtime ──────────────────

    #[tokio::test]
    async fn test_stream_roundtrip_through_runtime() {
        let runtime = Runtime::start(test_config()).await.unwrap();
        let coordinator = runtime.coordinator();

        let (peer_id, mut inbox) = coordinator.register_peer("remote-agent", vec![]);
        let stream_config = StreamConfig {
            biological_pacing: false,
            max_latency_us: 500_000,
            ..StreamConfig::default()
        };
        let established = coordinator
            .establish_stream(&peer_id, stream_config)
            .await
            .unwrap();

        let cancel = runtime.cancellation_token();
        let event = aura_core::Event::new(
            "consciousness.event",
            into_payload(json!({ "n": 1 })),
            "test",
        );
        coordinator
            .send_event(established.stream_id, event, &cancel)
            .await
            .unwrap();

        let delivered = tokio::time::timeout(Duration::from_secs(1), inbox.recv())
            .await
            .expect("delivery within budget")
            .expect("inbox open");
        assert_eq!(delivered.payload.get("n").and_then(|v| v.as_i64()), Some(1));

        runtime.shutdown().await;
    }
}
