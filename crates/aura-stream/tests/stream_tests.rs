#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use aura_bus::AgentBus;
    use aura_config::StreamConfig;
    use aura_core::{handler_fn, into_payload, AuraError, Event, EventSource, Payload};
    use aura_stream::{
        compute_metrics, ActivationKind, Pathway, PeerCoordinator, StreamSnapshot,
        INITIAL_WEIGHT, MAX_WEIGHT, MIN_WEIGHT,
    };

    /// Test streams run without pacing and with a latency budget wide enough
    /// that only deliberate staleness is rejected.
    fn fast_stream_config() -> StreamConfig {
        StreamConfig {
            biological_pacing: false,
            max_latency_us: 500_000,
            ..StreamConfig::default()
        }
    }

    fn event(n: u32) -> Event {
        Event::new("consciousness.event", into_payload(json!({ "n": n })), "test")
    }

    async fn wait_for<F>(mut condition: F, budget: Duration) -> bool
    where
        F: FnMut() -> bool,
    {
        let started = std::time::Instant::now();
        while started.elapsed() < budget {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        condition()
    }

    // ── Pathway adaptation ─────────────────────────────────────

    mod pathway {
        use super::*;

        #[test]
        fn test_rapid_activations_potentiate() {
            let mut pathway = Pathway::new("peer-1");
            assert_eq!(pathway.weight(), INITIAL_WEIGHT);

            let first = pathway.activate(None);
            assert_eq!(first, ActivationKind::Steady);
            let second = pathway.activate(None);
            assert_eq!(second, ActivationKind::Potentiated);
            assert!(pathway.weight() > INITIAL_WEIGHT);
        }

        #[test]
        fn test_long_gap_depresses() {
            let mut pathway = Pathway::new("peer-1");
            pathway.activate(None);
            std::thread::sleep(Duration::from_millis(120));
            let kind = pathway.activate(None);
            assert_eq!(kind, ActivationKind::Depressed);
            assert!(pathway.weight() < INITIAL_WEIGHT);
        }

        #[test]
        fn test_weight_clamped_to_bounds() {
            let mut pathway = Pathway::new("peer-1");
            for _ in 0..50 {
                pathway.activate(None);
            }
            assert!(pathway.weight() <= MAX_WEIGHT);

            let mut cold = Pathway::new("peer-2");
            for _ in 0..200 {
                cold.plasticity_tick();
            }
            assert!(cold.weight() >= MIN_WEIGHT);
        }

        #[test]
        fn test_plasticity_tick_decays_when_idle() {
            let mut pathway = Pathway::new("peer-1");
            pathway.plasticity_tick();
            assert!(pathway.weight() < INITIAL_WEIGHT);
        }

        #[test]
        fn test_ring_buffer_bounded() {
            let mut pathway = Pathway::new("peer-1");
            for n in 0..250u64 {
                pathway.activate(Some(n));
            }
            assert_eq!(pathway.recent_activations().len(), 100);
            // Oldest entries were evicted.
            let oldest = pathway.recent_activations().front().unwrap();
            assert_eq!(oldest.event_id, Some(150));
        }
    }

    // ── Stream consumption ─────────────────────────────────────

    mod stream {
        use super::*;

        async fn coordinator() -> Arc<PeerCoordinator> {
            let bus = Arc::new(AgentBus::new());
            PeerCoordinator::new(bus)
        }

        /// A sustained 2 ms-spaced burst potentiates the pathway and builds
        /// coherence; a long idle period followed by one event depresses the
        /// weight from its peak.
        #[tokio::test]
        async fn test_burst_potentiates_then_idle_depresses() {
            let coordinator = coordinator().await;
            let (peer_id, _inbox) = coordinator.register_peer("agent-1", vec![]);
            let established = coordinator
                .establish_stream(&peer_id, fast_stream_config())
                .await
                .unwrap();
            let cancel = CancellationToken::new();

            for n in 0..100 {
                coordinator
                    .send_event(established.stream_id, event(n), &cancel)
                    .await
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            let stream_id = established.stream_id;
            assert!(
                wait_for(
                    || {
                        coordinator
                            .stream_snapshot(stream_id)
                            .is_some_and(|s| s.events_processed == 100)
                    },
                    Duration::from_secs(2),
                )
                .await
            );
            let peak = coordinator.stream_snapshot(stream_id).unwrap();
            assert_eq!(peak.events_rejected, 0);
            assert!(peak.weight > INITIAL_WEIGHT, "burst potentiates");
            assert!(peak.coherence >= 0.9, "coherence built up");

            // Idle long enough for the burst to age out of the rate window,
            // then one late event triggers the long-gap depression.
            tokio::time::sleep(Duration::from_millis(1_200)).await;
            coordinator
                .send_event(stream_id, event(100), &cancel)
                .await
                .unwrap();
            assert!(
                wait_for(
                    || {
                        coordinator
                            .stream_snapshot(stream_id)
                            .is_some_and(|s| s.events_processed == 101)
                    },
                    Duration::from_secs(2),
                )
                .await
            );
            let after = coordinator.stream_snapshot(stream_id).unwrap();
            assert!(after.weight < peak.weight, "idle then LTD decreases weight");
        }

        #[tokio::test]
        async fn test_replay_within_window_rejected() {
            let coordinator = coordinator().await;
            let (peer_id, _inbox) = coordinator.register_peer("agent-1", vec![]);
            let established = coordinator
                .establish_stream(&peer_id, fast_stream_config())
                .await
                .unwrap();
            let cancel = CancellationToken::new();

            let original = event(1);
            coordinator
                .send_event(established.stream_id, original.clone(), &cancel)
                .await
                .unwrap();
            coordinator
                .send_event(established.stream_id, original, &cancel)
                .await
                .unwrap();

            let stream_id = established.stream_id;
            assert!(
                wait_for(
                    || {
                        coordinator.stream_snapshot(stream_id).is_some_and(|s| {
                            s.events_processed + s.events_rejected == 2
                        })
                    },
                    Duration::from_secs(2),
                )
                .await
            );
            let snapshot = coordinator.stream_snapshot(stream_id).unwrap();
            assert_eq!(snapshot.events_processed, 1);
            assert_eq!(snapshot.events_rejected, 1);
            assert!(snapshot.coherence < 0.5, "rejection lowers coherence");
        }

        #[tokio::test]
        async fn test_stale_event_rejected_at_send() {
            let coordinator = coordinator().await;
            let (peer_id, _inbox) = coordinator.register_peer("agent-1", vec![]);
            let config = StreamConfig {
                biological_pacing: false,
                max_latency_us: 1_000,
                ..StreamConfig::default()
            };
            let established = coordinator.establish_stream(&peer_id, config).await.unwrap();

            let stale = event(1);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let result = coordinator
                .send_event(established.stream_id, stale, &CancellationToken::new())
                .await;
            assert!(matches!(result, Err(AuraError::EventRejected(_))));
        }

        #[tokio::test]
        async fn test_cancelled_send_does_not_enqueue() {
            let coordinator = coordinator().await;
            let (peer_id, _inbox) = coordinator.register_peer("agent-1", vec![]);
            let established = coordinator
                .establish_stream(&peer_id, fast_stream_config())
                .await
                .unwrap();

            let cancel = CancellationToken::new();
            cancel.cancel();
            let result = coordinator
                .send_event(established.stream_id, event(1), &cancel)
                .await;
            assert!(matches!(result, Err(AuraError::Cancelled(_))));

            tokio::time::sleep(Duration::from_millis(30)).await;
            let snapshot = coordinator.stream_snapshot(established.stream_id).unwrap();
            assert_eq!(snapshot.events_processed + snapshot.events_rejected, 0);
        }

        #[tokio::test]
        async fn test_processed_events_reach_peer_inbox() {
            let coordinator = coordinator().await;
            let (peer_id, mut inbox) = coordinator.register_peer("agent-1", vec![]);
            let established = coordinator
                .establish_stream(&peer_id, fast_stream_config())
                .await
                .unwrap();

            coordinator
                .send_event(established.stream_id, event(7), &CancellationToken::new())
                .await
                .unwrap();

            let delivered = tokio::time::timeout(Duration::from_secs(1), inbox.recv())
                .await
                .expect("delivery within budget")
                .expect("inbox open");
            assert_eq!(delivered.payload.get("n").and_then(|v| v.as_u64()), Some(7));
        }

        #[tokio::test]
        async fn test_fifo_order_preserved() {
            let coordinator = coordinator().await;
            let (peer_id, mut inbox) = coordinator.register_peer("agent-1", vec![]);
            let established = coordinator
                .establish_stream(&peer_id, fast_stream_config())
                .await
                .unwrap();
            let cancel = CancellationToken::new();

            for n in 0..20 {
                coordinator
                    .send_event(established.stream_id, event(n), &cancel)
                    .await
                    .unwrap();
            }
            for expected in 0..20u64 {
                let delivered = tokio::time::timeout(Duration::from_secs(1), inbox.recv())
                    .await
                    .expect("delivery within budget")
                    .expect("inbox open");
                assert_eq!(
                    delivered.payload.get("n").and_then(|v| v.as_u64()),
                    Some(expected)
                );
            }
        }
    }

    // ── Establishment & lifecycle ──────────────────────────────

    mod lifecycle {
        use super::*;

        #[tokio::test]
        async fn test_establishment_reports_latency() {
            let bus = Arc::new(AgentBus::new());
            let coordinator = PeerCoordinator::new(bus);
            let (peer_id, _inbox) = coordinator.register_peer("agent-1", vec!["analysis".into()]);

            let config = StreamConfig {
                required_capabilities: vec!["analysis".into()],
                ..fast_stream_config()
            };
            let established = coordinator.establish_stream(&peer_id, config).await.unwrap();
            assert!(established.establishment_latency < Duration::from_millis(100));
            assert!(coordinator.stream_snapshot(established.stream_id).is_some());
        }

        #[tokio::test]
        async fn test_handshake_emitted_on_establishment() {
            let bus = Arc::new(AgentBus::new());
            let seen = Arc::new(parking_lot::Mutex::new(None::<Payload>));
            let seen_in_handler = Arc::clone(&seen);
            let source: Arc<dyn EventSource> = bus.clone();
            source
                .subscribe(
                    "consciousness.handshake",
                    handler_fn(move |_sender, _topic, payload: Payload| {
                        let seen = Arc::clone(&seen_in_handler);
                        async move {
                            seen.lock().get_or_insert(payload);
                            true
                        }
                    }),
                )
                .await;

            let coordinator = PeerCoordinator::new(bus);
            let (peer_id, _inbox) = coordinator.register_peer("agent-1", vec![]);
            coordinator
                .establish_stream(&peer_id, fast_stream_config())
                .await
                .unwrap();

            let handshake = seen.lock().clone().expect("handshake event");
            assert_eq!(
                handshake.get("targetPeer").and_then(|v| v.as_str()),
                Some(peer_id.as_str())
            );
        }

        #[tokio::test]
        async fn test_missing_capability_is_typed_failure() {
            let coordinator = PeerCoordinator::new(Arc::new(AgentBus::new()));
            let (peer_id, _inbox) = coordinator.register_peer("agent-1", vec!["text".into()]);

            let config = StreamConfig {
                required_capabilities: vec!["vision".into()],
                ..fast_stream_config()
            };
            let result = coordinator.establish_stream(&peer_id, config).await;
            assert!(matches!(
                result,
                Err(AuraError::MissingCapability { .. })
            ));
            assert!(coordinator.stream_snapshots().is_empty(), "no leaked stream");
        }

        #[tokio::test]
        async fn test_unknown_peer_rejected() {
            let coordinator = PeerCoordinator::new(Arc::new(AgentBus::new()));
            let result = coordinator
                .establish_stream("peer-missing", fast_stream_config())
                .await;
            assert!(matches!(result, Err(AuraError::PeerNotFound(_))));
        }

        #[tokio::test]
        async fn test_disconnect_closes_streams() {
            let coordinator = PeerCoordinator::new(Arc::new(AgentBus::new()));
            let (peer_id, _inbox) = coordinator.register_peer("agent-1", vec![]);
            let established = coordinator
                .establish_stream(&peer_id, fast_stream_config())
                .await
                .unwrap();

            assert!(coordinator.disconnect_peer(&peer_id).await);
            assert!(coordinator.stream_snapshot(established.stream_id).is_none());

            let result = coordinator
                .establish_stream(&peer_id, fast_stream_config())
                .await;
            assert!(matches!(result, Err(AuraError::PeerNotConnected(_))));
        }

        #[tokio::test]
        async fn test_close_stream_then_send_fails() {
            let coordinator = PeerCoordinator::new(Arc::new(AgentBus::new()));
            let (peer_id, _inbox) = coordinator.register_peer("agent-1", vec![]);
            let established = coordinator
                .establish_stream(&peer_id, fast_stream_config())
                .await
                .unwrap();

            assert!(coordinator.close_stream(established.stream_id).await);
            assert!(!coordinator.close_stream(established.stream_id).await);

            let result = coordinator
                .send_event(
                    established.stream_id,
                    event(1),
                    &CancellationToken::new(),
                )
                .await;
            assert!(matches!(result, Err(AuraError::StreamNotFound(_))));
        }

        #[tokio::test]
        async fn test_shutdown_stops_everything() {
            let coordinator = PeerCoordinator::new(Arc::new(AgentBus::new()));
            let (peer_id, _inbox) = coordinator.register_peer("agent-1", vec![]);
            coordinator
                .establish_stream(&peer_id, fast_stream_config())
                .await
                .unwrap();

            coordinator.shutdown().await;
            assert!(coordinator.stream_snapshots().is_empty());
            assert!(coordinator.peers().is_empty());
        }
    }

    // ── Network aggregation ────────────────────────────────────

    mod aggregation {
        use super::*;

        fn snapshot(coherence: f64, latency_us: f64, processed: u64) -> StreamSnapshot {
            StreamSnapshot {
                stream_id: uuid::Uuid::new_v4(),
                peer_id: "peer-1".into(),
                coherence,
                avg_latency_us: latency_us,
                events_processed: processed,
                events_rejected: 0,
                weight: INITIAL_WEIGHT,
            }
        }

        #[test]
        fn test_compute_metrics_empty() {
            let metrics = compute_metrics(&[]);
            assert_eq!(metrics.active_streams, 0);
            assert_eq!(metrics.emergent_intelligence, 0.0);
        }

        #[test]
        fn test_compute_metrics_single_stream() {
            let metrics = compute_metrics(&[snapshot(1.0, 500.0, 10)]);
            assert_eq!(metrics.active_streams, 1);
            assert_eq!(metrics.global_coherence, 1.0);
            // 0.7·1.0 + 0.2·log10(2) + 0.1 sub-millisecond bonus
            let expected = 0.7 + 0.2 * 2f64.log10() + 0.1;
            assert!((metrics.emergent_intelligence - expected).abs() < 1e-9);
        }

        #[test]
        fn test_compute_metrics_means_and_no_bonus() {
            let metrics = compute_metrics(&[
                snapshot(0.8, 2_000.0, 5),
                snapshot(0.4, 4_000.0, 15),
            ]);
            assert!((metrics.global_coherence - 0.6).abs() < 1e-9);
            assert!((metrics.avg_latency_us - 3_000.0).abs() < 1e-9);
            assert_eq!(metrics.total_events_processed, 20);
            let expected = 0.7 * 0.6 + 0.2 * 3f64.log10();
            assert!((metrics.emergent_intelligence - expected).abs() < 1e-9);
        }

        #[test]
        fn test_emergent_intelligence_clamped() {
            let many: Vec<StreamSnapshot> =
                (0..50).map(|_| snapshot(1.0, 100.0, 1)).collect();
            let metrics = compute_metrics(&many);
            assert!(metrics.emergent_intelligence <= 1.0);
        }

        #[tokio::test]
        async fn test_network_metrics_emitted() {
            let bus = Arc::new(AgentBus::new());
            let seen = Arc::new(parking_lot::Mutex::new(None::<Payload>));
            let seen_in_handler = Arc::clone(&seen);
            let source: Arc<dyn EventSource> = bus.clone();
            source
                .subscribe(
                    "network.metrics",
                    handler_fn(move |_sender, _topic, payload: Payload| {
                        let seen = Arc::clone(&seen_in_handler);
                        async move {
                            seen.lock().get_or_insert(payload);
                            true
                        }
                    }),
                )
                .await;

            let coordinator = PeerCoordinator::new(bus);
            let (peer_id, _inbox) = coordinator.register_peer("agent-1", vec![]);
            coordinator
                .establish_stream(&peer_id, fast_stream_config())
                .await
                .unwrap();

            assert!(
                wait_for(|| seen.lock().is_some(), Duration::from_secs(2)).await,
                "aggregator tick publishes network.metrics"
            );
            let payload = seen.lock().clone().unwrap();
            assert_eq!(
                payload.get("activeStreams").and_then(|v| v.as_u64()),
                Some(1)
            );
            assert!(coordinator.network_metrics().is_some());
        }
    }
}
