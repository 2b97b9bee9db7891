use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use aura_bus::{AgentBus, AgentSpec, EmitOptions};
use aura_core::{first_str, handler_fn, into_payload, Payload};

const SERVICE_NAME: &str = "file-service";

/// File I/O as an ordinary bus subscriber.
///
/// `system.file.read {path}` emits `system.file.read.success
/// {path, contents}` or `system.file.read.error {path, error}`.
/// `system.file.write {path, contents|content|object, append?}` emits the
/// corresponding `.success`/`.error` follow-up.
pub struct FileService;

impl FileService {
    pub fn register(bus: &Arc<AgentBus>) -> aura_core::Result<String> {
        let agent_id = bus.join_bus(
            AgentSpec::new(SERVICE_NAME, "service")
                .with_filter("system.file.read")
                .with_filter("system.file.write"),
        );

        let read_bus = Arc::clone(bus);
        bus.subscribe(
            &agent_id,
            "system.file.read",
            handler_fn(move |_sender, _topic, payload: Payload| {
                let bus = Arc::clone(&read_bus);
                async move {
                    let Some(path) = payload.get("path").and_then(|v| v.as_str()) else {
                        respond(
                            &bus,
                            "system.file.read.error",
                            json!({ "error": "missing path" }),
                        )
                        .await;
                        return false;
                    };
                    match tokio::fs::read_to_string(path).await {
                        Ok(contents) => {
                            debug!(path, bytes = contents.len(), "file read");
                            respond(
                                &bus,
                                "system.file.read.success",
                                json!({ "path": path, "contents": contents }),
                            )
                            .await;
                            true
                        }
                        Err(e) => {
                            respond(
                                &bus,
                                "system.file.read.error",
                                json!({ "path": path, "error": e.to_string() }),
                            )
                            .await;
                            false
                        }
                    }
                }
            }),
        )?;

        let write_bus = Arc::clone(bus);
        bus.subscribe(
            &agent_id,
            "system.file.write",
            handler_fn(move |_sender, _topic, payload: Payload| {
                let bus = Arc::clone(&write_bus);
                async move {
                    let Some(path) = payload.get("path").and_then(|v| v.as_str()) else {
                        respond(
                            &bus,
                            "system.file.write.error",
                            json!({ "error": "missing path" }),
                        )
                        .await;
                        return false;
                    };
                    let contents = match first_str(&payload, &["contents", "content"]) {
                        Some(text) => text.to_string(),
                        None => match payload.get("object") {
                            Some(object) => match serde_json::to_string_pretty(object) {
                                Ok(rendered) => rendered,
                                Err(e) => {
                                    respond(
                                        &bus,
                                        "system.file.write.error",
                                        json!({ "path": path, "error": e.to_string() }),
                                    )
                                    .await;
                                    return false;
                                }
                            },
                            None => String::new(),
                        },
                    };
                    let append = payload
                        .get("append")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);

                    let written = if append {
                        use tokio::io::AsyncWriteExt;
                        match tokio::fs::OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(path)
                            .await
                        {
                            Ok(mut file) => file.write_all(contents.as_bytes()).await,
                            Err(e) => Err(e),
                        }
                    } else {
                        tokio::fs::write(path, contents.as_bytes()).await
                    };

                    match written {
                        Ok(()) => {
                            debug!(path, bytes = contents.len(), append, "file written");
                            respond(
                                &bus,
                                "system.file.write.success",
                                json!({ "path": path, "bytesWritten": contents.len() }),
                            )
                            .await;
                            true
                        }
                        Err(e) => {
                            respond(
                                &bus,
                                "system.file.write.error",
                                json!({ "path": path, "error": e.to_string() }),
                            )
                            .await;
                            false
                        }
                    }
                }
            }),
        )?;

        Ok(agent_id)
    }
}

async fn respond(bus: &AgentBus, topic: &str, payload: serde_json::Value) {
    bus.emit_with(
        topic,
        into_payload(payload),
        EmitOptions::from_source(SERVICE_NAME),
    )
    .await;
}
