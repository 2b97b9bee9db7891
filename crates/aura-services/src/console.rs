use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use aura_bus::{AgentBus, AgentSpec, EmitOptions};
use aura_core::{handler_fn, into_payload, Payload};

const SERVICE_NAME: &str = "console-service";

/// Console I/O as an ordinary bus subscriber.
///
/// Handles `system.console.write`, `system.console.read`, and
/// `system.console.clear`. A read prompts on stdout and emits the captured
/// line as `system.console.read.success`.
pub struct ConsoleService;

impl ConsoleService {
    pub fn register(bus: &Arc<AgentBus>) -> aura_core::Result<String> {
        let agent_id = bus.join_bus(
            AgentSpec::new(SERVICE_NAME, "service")
                .with_filter("system.console.write")
                .with_filter("system.console.read")
                .with_filter("system.console.clear"),
        );

        bus.subscribe(
            &agent_id,
            "system.console.write",
            handler_fn(|_sender, _topic, payload: Payload| async move {
                if let Some(text) = payload.get("text").and_then(|v| v.as_str()) {
                    println!("{text}");
                    return true;
                }
                if let Some(object) = payload.get("object") {
                    match serde_json::to_string_pretty(object) {
                        Ok(rendered) => println!("{rendered}"),
                        Err(e) => {
                            warn!(error = %e, "console write: unrenderable object");
                            return false;
                        }
                    }
                    return true;
                }
                // Nothing to write is not an error; blank line semantics.
                println!();
                true
            }),
        )?;

        let read_bus = Arc::clone(bus);
        bus.subscribe(
            &agent_id,
            "system.console.read",
            handler_fn(move |_sender, _topic, payload: Payload| {
                let bus = Arc::clone(&read_bus);
                async move {
                    if let Some(prompt) = payload.get("prompt").and_then(|v| v.as_str()) {
                        print!("{prompt}");
                        use std::io::Write;
                        let _ = std::io::stdout().flush();
                    }
                    let line = tokio::task::spawn_blocking(|| {
                        let mut line = String::new();
                        std::io::stdin().read_line(&mut line).map(|_| line)
                    })
                    .await;
                    match line {
                        Ok(Ok(line)) => {
                            let input = line.trim_end_matches(['\r', '\n']);
                            bus.emit_with(
                                "system.console.read.success",
                                into_payload(json!({ "input": input })),
                                EmitOptions::from_source(SERVICE_NAME),
                            )
                            .await;
                            true
                        }
                        _ => {
                            bus.emit_with(
                                "system.console.read.error",
                                into_payload(json!({ "error": "stdin read failed" })),
                                EmitOptions::from_source(SERVICE_NAME),
                            )
                            .await;
                            false
                        }
                    }
                }
            }),
        )?;

        bus.subscribe(
            &agent_id,
            "system.console.clear",
            handler_fn(|_sender, _topic, _payload: Payload| async move {
                // ANSI clear-screen + cursor home.
                print!("\x1b[2J\x1b[H");
                use std::io::Write;
                let _ = std::io::stdout().flush();
                true
            }),
        )?;

        Ok(agent_id)
    }
}
