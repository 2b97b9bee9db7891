use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tokio::sync::oneshot;
use tracing::info;

use aura_bus::AgentSpec;
use aura_config::{AuraConfig, ConfigLoader, StreamConfig};
use aura_core::{handler_fn, into_payload, Event, Payload};
use aura_runtime::Runtime;

/// Aura — event-driven coordination runtime for autonomous agents
#[derive(Parser)]
#[command(name = "aura", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to aura.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the runtime and serve events until ctrl-c
    Run,
    /// Run a self-contained demonstration scenario
    Demo {
        #[arg(value_enum)]
        scenario: DemoScenario,
    },
    /// Show the resolved configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DemoScenario {
    /// Fan out one event into parallel handler branches and aggregate
    Fanout,
    /// Establish a peer stream and watch the pathway adapt
    Stream,
}

impl Cli {
    pub async fn run(self) -> aura_core::Result<()> {
        let config = ConfigLoader::load(self.config.as_deref())?;

        let log_level = self
            .log_level
            .as_deref()
            .unwrap_or(&config.logging.level)
            .to_string();
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
            )
            .with_target(false)
            .init();

        match self.command {
            Commands::Run => Self::cmd_run(config).await,
            Commands::Demo { scenario } => match scenario {
                DemoScenario::Fanout => Self::cmd_demo_fanout(config).await,
                DemoScenario::Stream => Self::cmd_demo_stream(config).await,
            },
            Commands::Config { json } => Self::cmd_config(config, json),
        }
    }

    async fn cmd_run(config: AuraConfig) -> aura_core::Result<()> {
        let runtime = Runtime::start(config).await?;
        info!("runtime serving; press ctrl-c to stop");
        let _ = tokio::signal::ctrl_c().await;
        runtime.shutdown().await;
        Ok(())
    }

    /// Two branch producers answer on their `.result` topics; one emission
    /// with a handler map fans out to both and the aggregate comes back as
    /// `work.start.enhanced`.
    async fn cmd_demo_fanout(config: AuraConfig) -> aura_core::Result<()> {
        let runtime = Runtime::start(config).await?;
        let bus = runtime.bus();

        let producers = bus.join_bus(AgentSpec::new("demo-producers", "worker"));
        let bus_for_analysis = Arc::clone(bus);
        bus.subscribe(
            &producers,
            "analysis.complete",
            handler_fn(move |_sender, _topic, _payload: Payload| {
                let bus = Arc::clone(&bus_for_analysis);
                async move {
                    bus.emit(
                        "analysis.complete.result",
                        into_payload(json!({ "score": 0.9, "verdict": "coherent" })),
                    )
                    .await;
                    true
                }
            }),
        )?;
        let bus_for_report = Arc::clone(bus);
        bus.subscribe(
            &producers,
            "report.generated",
            handler_fn(move |_sender, _topic, _payload: Payload| {
                let bus = Arc::clone(&bus_for_report);
                async move {
                    bus.emit(
                        "report.generated.result",
                        into_payload(json!({ "pages": 3 })),
                    )
                    .await;
                    true
                }
            }),
        )?;

        let (done_tx, done_rx) = oneshot::channel::<Payload>();
        let done = Arc::new(parking_lot::Mutex::new(Some(done_tx)));
        let watcher = bus.join_bus(AgentSpec::new("demo-watcher", "observer"));
        bus.subscribe(
            &watcher,
            "work.start.enhanced",
            handler_fn(move |_sender, _topic, payload: Payload| {
                let done = Arc::clone(&done);
                async move {
                    if let Some(tx) = done.lock().take() {
                        let _ = tx.send(payload);
                    }
                    true
                }
            }),
        )?;

        bus.emit(
            "work.start",
            into_payload(json!({
                "task": "demo",
                "handlers": {
                    "analysis": "analysis.complete",
                    "report": "report.generated",
                },
            })),
        )
        .await;

        match tokio::time::timeout(Duration::from_secs(5), done_rx).await {
            Ok(Ok(enhanced)) => {
                println!("enhanced payload:");
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::Value::Object(enhanced))?
                );
            }
            _ => println!("no enhanced event within 5s"),
        }

        runtime.shutdown().await;
        Ok(())
    }

    /// Open a stream to a demo peer, push a paced burst of events through
    /// it, and print the stream and network aggregates.
    async fn cmd_demo_stream(config: AuraConfig) -> aura_core::Result<()> {
        let runtime = Runtime::start(config).await?;
        let coordinator = runtime.coordinator();

        let (peer_id, mut inbox) = coordinator.register_peer("demo-peer", vec!["demo".into()]);
        let stream_config = StreamConfig {
            // Demo pacing is far slower than the 1 ms production budget.
            max_latency_us: 250_000,
            ..StreamConfig::default()
        };
        let established = coordinator.establish_stream(&peer_id, stream_config).await?;
        println!(
            "stream {} established in {}ms",
            established.stream_id,
            established.establishment_latency.as_millis()
        );

        let cancel = runtime.cancellation_token();
        for n in 0..50u32 {
            let event = Event::new(
                "consciousness.event",
                into_payload(json!({ "sequence": n })),
                "demo",
            );
            coordinator
                .send_event(established.stream_id, event, &cancel)
                .await?;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let mut delivered = 0;
        while inbox.try_recv().is_ok() {
            delivered += 1;
        }
        if let Some(snapshot) = coordinator.stream_snapshot(established.stream_id) {
            println!(
                "processed={} rejected={} delivered={} coherence={:.2} weight={:.2}",
                snapshot.events_processed,
                snapshot.events_rejected,
                delivered,
                snapshot.coherence,
                snapshot.weight
            );
        }
        if let Some(metrics) = coordinator.network_metrics() {
            println!(
                "network: streams={} coherence={:.2} emergent={:.2}",
                metrics.active_streams, metrics.global_coherence, metrics.emergent_intelligence
            );
        }

        runtime.shutdown().await;
        Ok(())
    }

    fn cmd_config(config: AuraConfig, json: bool) -> aura_core::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| aura_core::AuraError::Config(e.to_string()))?;
            println!("{rendered}");
        }
        Ok(())
    }
}
