use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use aura_bus::AgentBus;
use aura_config::AuraConfig;
use aura_core::EventSource;
use aura_fanout::ParallelEngine;
use aura_services::{ConsoleService, FileService, TimeService};
use aura_stream::PeerCoordinator;

/// The assembled runtime.
///
/// One `Runtime` owns one bus, one fan-out engine (installed as the bus's
/// emit interceptor), one peer coordinator, and the system services. Every
/// collaborator is injected at construction; there is no process-wide
/// registry.
pub struct Runtime {
    config: AuraConfig,
    bus: Arc<AgentBus>,
    engine: Arc<ParallelEngine>,
    coordinator: Arc<PeerCoordinator>,
    service_agents: Vec<String>,
    cancel: CancellationToken,
}

impl Runtime {
    pub async fn start(config: AuraConfig) -> aura_core::Result<Self> {
        let bus = Arc::new(AgentBus::new());
        let source: Arc<dyn EventSource> = Arc::clone(&bus) as Arc<dyn EventSource>;

        let engine = ParallelEngine::new(Arc::clone(&source), config.parallel.clone());
        bus.set_interceptor(engine.interceptor());

        let coordinator = PeerCoordinator::new(Arc::clone(&source));

        let service_agents = vec![
            ConsoleService::register(&bus)?,
            FileService::register(&bus)?,
            TimeService::register(&bus)?,
        ];

        info!(
            max_concurrent = config.parallel.effective_max_concurrent(),
            parameter_timeout_ms = config.parallel.parameter_timeout_ms,
            "runtime started"
        );
        Ok(Self {
            config,
            bus,
            engine,
            coordinator,
            service_agents,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &AuraConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<AgentBus> {
        &self.bus
    }

    pub fn engine(&self) -> &Arc<ParallelEngine> {
        &self.engine
    }

    pub fn coordinator(&self) -> &Arc<PeerCoordinator> {
        &self.coordinator
    }

    /// Token cancelled when the runtime shuts down. Long-running callers
    /// should derive their own child tokens from it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Graceful shutdown: cancel in-flight fan-outs, stop all streams and
    /// the aggregator, deregister the services.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.engine.shutdown();
        self.coordinator.shutdown().await;
        for agent_id in &self.service_agents {
            self.bus.leave_bus(agent_id);
        }
        info!("runtime stopped");
    }
}
