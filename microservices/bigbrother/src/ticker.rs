//! Drives health passes for clusters that are due

use std::sync::Arc;
use std::time::{Duration, Instant};

use bigbrother_ipvs::{
    Cluster, ClusterCollection, HealthFetcher, Ipvs, OverrideHealth, OverrideStatus,
    StatusOverride,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

#[derive(Clone)]
pub struct Ticker {
    clusters: Arc<ClusterCollection>,
    ipvs: Ipvs,
    health: Arc<dyn HealthFetcher>,
    overrides: Arc<dyn StatusOverride>,
    interval: Duration,
}

impl Ticker {
    pub fn new(
        clusters: Arc<ClusterCollection>,
        ipvs: Ipvs,
        health: Arc<dyn HealthFetcher>,
        overrides: Arc<dyn StatusOverride>,
        interval: Duration,
    ) -> Self {
        Self {
            clusters,
            ipvs,
            health,
            overrides,
            interval,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick();
        }
    }

    /// Start a pass for every due cluster, each on its own task so a slow or
    /// failing cluster does not hold up the rest.
    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        self.clusters
            .ready_for_check()
            .into_iter()
            .map(|cluster| {
                tokio::spawn(monitor_cluster(
                    cluster,
                    self.ipvs.clone(),
                    self.health.clone(),
                    self.overrides.clone(),
                ))
            })
            .collect()
    }
}

async fn monitor_cluster(
    cluster: Arc<Mutex<Cluster>>,
    ipvs: Ipvs,
    health: Arc<dyn HealthFetcher>,
    overrides: Arc<dyn StatusOverride>,
) {
    let mut cluster = cluster.lock().await;
    if !cluster.needs_check() {
        return;
    }

    let started = Instant::now();
    let health = OverrideHealth::resolve(health.as_ref(), overrides.as_ref(), cluster.name()).await;
    if health.status() != OverrideStatus::None {
        debug!(cluster = %*cluster, status = ?health.status(), "Operator override in effect");
    }

    match cluster.monitor_nodes(&ipvs, &health).await {
        Ok(()) => ipvs.metrics().record_pass(started.elapsed()),
        Err(e) => error!(cluster = %*cluster, error = %e, "Monitor pass failed"),
    }
}
