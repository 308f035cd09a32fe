//! Service infrastructure for the daemon

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::error::Result;

/// Health status for liveness probes
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub service_id: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub monitored_clusters: usize,
}

/// Trait the daemon implements to be driven by [`DaemonRuntime`]
#[async_trait]
pub trait BigBrotherService: Send + Sync + 'static {
    fn service_id(&self) -> &'static str;

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Re-read configuration (SIGHUP)
    async fn reload(&self) -> Result<()>;

    /// Graceful shutdown
    async fn shutdown(&self) -> Result<()>;

    /// Start the service (ticker, HTTP API)
    async fn start(&self) -> Result<()>;
}

enum Signal {
    Reload,
    Terminate,
}

/// Daemon runtime bootstrap
pub struct DaemonRuntime {
    config: ServiceConfig,
    start_time: std::time::Instant,
}

impl DaemonRuntime {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run a service until SIGINT/SIGTERM, reloading it on SIGHUP
    pub async fn run<S: BigBrotherService>(self, service: Arc<S>) -> Result<()> {
        info!(
            service_id = service.service_id(),
            version = service.version(),
            name = %self.config.service_name,
            "Starting daemon"
        );

        let service_clone = service.clone();
        let service_handle = tokio::spawn(async move {
            if let Err(e) = service_clone.start().await {
                tracing::error!("Service error: {}", e);
            }
        });

        loop {
            match Self::wait_for_signal().await {
                Signal::Reload => {
                    info!("Reload signal received");
                    if let Err(e) = service.reload().await {
                        warn!(error = %e, "Reload failed, keeping previous configuration");
                    }
                }
                Signal::Terminate => break,
            }
        }

        info!("Shutdown signal received, gracefully stopping...");

        if let Err(e) = service.shutdown().await {
            warn!("Error during shutdown: {}", e);
        }

        service_handle.abort();

        info!(
            uptime_seconds = self.start_time.elapsed().as_secs(),
            "Daemon stopped"
        );

        Ok(())
    }

    #[cfg(unix)]
    async fn wait_for_signal() -> Signal {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        let mut terminate =
            unix_signal(SignalKind::terminate()).expect("Failed to listen for SIGTERM");
        let mut hangup = unix_signal(SignalKind::hangup()).expect("Failed to listen for SIGHUP");

        tokio::select! {
            _ = signal::ctrl_c() => Signal::Terminate,
            _ = terminate.recv() => Signal::Terminate,
            _ = hangup.recv() => Signal::Reload,
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_signal() -> Signal {
        signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        Signal::Terminate
    }
}
