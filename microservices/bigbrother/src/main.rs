//! BigBrother
//!
//! Keeps IPVS fwmark services in line with the health of their backends:
//! - Adopts services left running by a previous instance
//! - Periodic health passes translating scores into weights
//! - Downpage failover when a whole cluster is down
//! - Reload of the cluster file on SIGHUP
//! - HTTP API to start and stop monitoring per cluster

use std::sync::Arc;
use std::time::Instant;

use bigbrother_core::{BigBrotherService, DaemonRuntime, Result, ServiceConfig};
use bigbrother_ipvs::{
    ClusterCollection, FileStatusOverride, HealthFetcher, HttpHealthFetcher, Ipvs, ShellExecutor,
    StatusOverride,
};
use bigbrother_telemetry::TelemetryConfig;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

mod api;
mod config;
mod ticker;

#[cfg(test)]
mod testing;

use api::ApiState;
use ticker::Ticker;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServiceConfig::from_env()?;

    let telemetry = TelemetryConfig::new(&config.service_name, &config.log_level)
        .with_json_logs(config.json_logs);
    if let Err(e) = bigbrother_telemetry::init(&telemetry) {
        eprintln!("failed to initialise logging: {}", e);
    }

    info!("Starting BigBrother");

    let service = Arc::new(BigBrotherDaemon::new(config.clone()).await?);
    DaemonRuntime::new(config).run(service).await
}

/// Daemon state
pub struct BigBrotherDaemon {
    config: ServiceConfig,
    clusters: Arc<ClusterCollection>,
    ipvs: Ipvs,
    health: Arc<dyn HealthFetcher>,
    overrides: Arc<dyn StatusOverride>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    start_time: Instant,
}

impl BigBrotherDaemon {
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        let clusters = config::load_clusters(&config.config_path, config.check_interval).await?;
        info!(
            path = %config.config_path.display(),
            clusters = clusters.len(),
            "Loaded cluster configuration"
        );

        let ipvs = Ipvs::new(Arc::new(ShellExecutor::new(config.command_timeout)));
        let health = Arc::new(HttpHealthFetcher::new(config.health_timeout)?);
        let overrides = Arc::new(FileStatusOverride::new(config.status_dir.clone()));

        Ok(Self {
            clusters: Arc::new(ClusterCollection::new(clusters)),
            ipvs,
            health,
            overrides,
            ticker: Mutex::new(None),
            start_time: Instant::now(),
            config,
        })
    }

    async fn refresh_monitored_gauge(&self) {
        let running = self.clusters.running().await.len();
        self.ipvs.metrics().monitored_clusters.set(running as u64);
    }
}

#[async_trait::async_trait]
impl BigBrotherService for BigBrotherDaemon {
    fn service_id(&self) -> &'static str {
        "bigbrother"
    }

    async fn reload(&self) -> Result<()> {
        let clusters =
            config::load_clusters(&self.config.config_path, self.config.check_interval).await?;
        info!(clusters = clusters.len(), "Reconfiguring clusters");

        for (name, e) in self.clusters.reconfigure(clusters, &self.ipvs).await {
            warn!(cluster = %name, error = %e, "Cluster not fully reconciled after reload");
        }
        self.refresh_monitored_gauge().await;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        // IPVS services stay in place; the next start adopts them.
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
        info!("Shutting down BigBrother");
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        info!(
            http = %self.config.http_bind,
            tick_ms = self.config.tick_interval.as_millis() as u64,
            clusters = self.clusters.len(),
            "Starting BigBrother"
        );

        let failures = self.clusters.synchronize_all(&self.ipvs).await;
        if !failures.is_empty() {
            error!(failed = failures.len(), "Some clusters failed to synchronize");
        }
        self.refresh_monitored_gauge().await;

        let ticker = Ticker::new(
            self.clusters.clone(),
            self.ipvs.clone(),
            self.health.clone(),
            self.overrides.clone(),
            self.config.tick_interval,
        );
        *self.ticker.lock().await = Some(ticker.spawn());

        let app = api::router(ApiState {
            clusters: self.clusters.clone(),
            ipvs: self.ipvs.clone(),
            service_id: self.service_id(),
            version: self.version(),
            started: self.start_time,
        });

        let listener = tokio::net::TcpListener::bind(&self.config.http_bind).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
