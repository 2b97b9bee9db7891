#[cfg(test)]
mod tests {
    use aura_core::*;
    use serde_json::json;

    // ── Event tests ────────────────────────────────────────────

    #[test]
    fn test_event_creation() {
        let event = Event::new("work.start", into_payload(json!({ "n": 1 })), "tester");
        assert_eq!(event.topic, "work.start");
        assert_eq!(event.source, "tester");
        assert_eq!(event.payload.get("n").and_then(|v| v.as_i64()), Some(1));
    }

    #[test]
    fn test_event_timestamps_monotonic() {
        let a = Event::new("t", Payload::new(), "s");
        let b = Event::new("t", Payload::new(), "s");
        assert!(b.timestamp_ns >= a.timestamp_ns);
    }

    #[test]
    fn test_event_age_grows() {
        let event = Event::new("t", Payload::new(), "s");
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(event.age() >= std::time::Duration::from_millis(2));
    }

    #[test]
    fn test_event_serde_roundtrip() {
        let event = Event::new(
            "system.file.read",
            into_payload(json!({ "path": "/tmp/x", "nested": { "a": [1, 2] } })),
            "tester",
        );
        let encoded = serde_json::to_string(&event).unwrap();
        let restored: Event = serde_json::from_str(&encoded).unwrap();
        assert_eq!(restored.topic, "system.file.read");
        assert_eq!(restored.timestamp_ns, event.timestamp_ns);
        assert_eq!(restored.payload, event.payload);
    }

    // ── Payload helpers ────────────────────────────────────────

    #[test]
    fn test_into_payload_object_passthrough() {
        let payload = into_payload(json!({ "a": 1, "b": "two" }));
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.get("b").and_then(|v| v.as_str()), Some("two"));
    }

    #[test]
    fn test_into_payload_wraps_scalars() {
        let payload = into_payload(json!(42));
        assert_eq!(payload.get("value").and_then(|v| v.as_i64()), Some(42));
    }

    #[test]
    fn test_first_str_alias_order() {
        let payload = into_payload(json!({ "content": "b", "contents": "a" }));
        assert_eq!(first_str(&payload, &["contents", "content"]), Some("a"));
        assert_eq!(first_str(&payload, &["missing", "content"]), Some("b"));
        assert_eq!(first_str(&payload, &["missing"]), None);
    }

    // ── Handler tests ──────────────────────────────────────────

    #[tokio::test]
    async fn test_handler_fn_invocation() {
        let handler = handler_fn(|sender, topic, payload: Payload| async move {
            sender == "src" && topic == "t" && payload.contains_key("k")
        });
        let payload = into_payload(json!({ "k": true }));
        assert!(handler.handle("src", "t", &payload).await);
        assert!(!handler.handle("other", "t", &payload).await);
    }

    #[test]
    fn test_handler_identity_stable() {
        let handler = handler_fn(|_, _, _| async { true });
        let other = handler_fn(|_, _, _| async { true });
        assert_eq!(handler_identity(&handler), handler_identity(&handler.clone()));
        assert_ne!(handler_identity(&handler), handler_identity(&other));
    }

    // ── Scope & id tests ───────────────────────────────────────

    #[test]
    fn test_scope_serde_roundtrip() {
        for scope in [
            DeliveryScope::Global,
            DeliveryScope::Agent,
            DeliveryScope::Channel,
            DeliveryScope::Role,
            DeliveryScope::Hierarchy,
        ] {
            let encoded = serde_json::to_string(&scope).unwrap();
            let restored: DeliveryScope = serde_json::from_str(&encoded).unwrap();
            assert_eq!(scope, restored);
        }
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(DeliveryScope::Channel.to_string(), "channel");
        assert_eq!(DeliveryScope::default(), DeliveryScope::Global);
    }

    #[test]
    fn test_short_id_shape() {
        let id = short_id("My Analyzer");
        assert!(id.starts_with("my-analyzer-"));
        assert_eq!(id.len(), "my-analyzer-".len() + 8);
        assert_ne!(short_id("My Analyzer"), short_id("My Analyzer"));
    }

    #[test]
    fn test_short_id_empty_name() {
        let id = short_id("");
        assert!(id.starts_with("agent-"));
    }

    // ── Error tests ────────────────────────────────────────────

    #[test]
    fn test_error_display() {
        let err = AuraError::AgentNotFound("a-1".into());
        assert!(err.to_string().contains("a-1"));
    }

    #[test]
    fn test_error_handshake_timeout() {
        let err = AuraError::HandshakeTimeout {
            peer: "peer-1".into(),
            budget_ms: 100,
            elapsed_ms: 140,
        };
        let s = err.to_string();
        assert!(s.contains("peer-1"));
        assert!(s.contains("100"));
        assert!(s.contains("140"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let err: AuraError = io_err.into();
        assert!(err.to_string().contains("missing file"));
    }
}
