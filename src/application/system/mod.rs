use anyhow::Result;
use tracing::info;

pub mod shutdown_service;

use crate::application::bootstrap::services::ServicesBootstrap;
use crate::application::monitoring::{LoopExit, LoopSettings, MonitorLoop};
use crate::application::system::shutdown_service::ShutdownSignal;
use crate::config::Config;
use crate::infrastructure::observability::Metrics;

/// Fully wired forwarder, ready to run.
pub struct Application {
    pub config: Config,
    pub shutdown: ShutdownSignal,
    pub monitor: MonitorLoop,
}

impl Application {
    pub fn build(config: Config, force_managed_identity: bool) -> Result<Self> {
        info!(
            "Building azmon-forwarder (source: {}, namespace: {})...",
            config.monitor.prometheus_url, config.monitor.namespace
        );

        let metrics = Metrics::new()?;
        let shutdown = ShutdownSignal::new();
        let services = ServicesBootstrap::init(&config, force_managed_identity);

        let monitor = MonitorLoop::new(
            services.source,
            services.resolver,
            services.forwarder,
            LoopSettings::from(&config.monitor),
            shutdown.clone(),
            metrics,
        );

        Ok(Self {
            config,
            shutdown,
            monitor,
        })
    }

    pub async fn health_check(&self) -> bool {
        self.monitor.health_check().await
    }

    pub async fn run_once(&mut self) -> LoopExit {
        self.monitor.run_once().await
    }

    /// Install the signal listener and run until shutdown or failure.
    pub async fn run(&mut self) -> LoopExit {
        let listener = self.shutdown.install();
        let exit = self.monitor.run().await;
        listener.abort();
        exit
    }
}
