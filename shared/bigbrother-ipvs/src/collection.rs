//! The set of clusters a daemon manages

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::cluster::{Cluster, ClusterSummary};
use crate::ipvs::Ipvs;
use crate::types::*;

/// Clusters by name. Each sits behind its own mutex, which serializes every
/// IPVS mutation for its fwmark while other clusters proceed in parallel.
#[derive(Default)]
pub struct ClusterCollection {
    clusters: DashMap<String, Arc<Mutex<Cluster>>>,
}

impl ClusterCollection {
    pub fn new(clusters: impl IntoIterator<Item = Cluster>) -> Self {
        let collection = Self::default();
        for cluster in clusters {
            collection
                .clusters
                .insert(cluster.name().to_string(), Arc::new(Mutex::new(cluster)));
        }
        collection
    }

    pub fn get(&self, name: &str) -> Option<Arc<Mutex<Cluster>>> {
        self.clusters.get(name).map(|c| c.value().clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clusters.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    // Clone the handles out so no map guard is held across an await.
    fn handles(&self) -> Vec<(String, Arc<Mutex<Cluster>>)> {
        let mut handles: Vec<_> = self
            .clusters
            .iter()
            .map(|c| (c.key().clone(), c.value().clone()))
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles
    }

    /// Clusters due for a health pass. A cluster whose lock is held is
    /// skipped; it is already being worked on.
    pub fn ready_for_check(&self) -> Vec<Arc<Mutex<Cluster>>> {
        self.handles()
            .into_iter()
            .filter_map(|(_, cluster)| {
                let due = cluster.try_lock().map(|c| c.needs_check()).unwrap_or(false);
                due.then_some(cluster)
            })
            .collect()
    }

    /// Names of monitored clusters
    pub async fn running(&self) -> Vec<String> {
        let mut running = Vec::new();
        for (name, cluster) in self.handles() {
            if cluster.lock().await.monitored() {
                running.push(name);
            }
        }
        running
    }

    pub async fn summaries(&self) -> Vec<ClusterSummary> {
        let mut summaries = Vec::with_capacity(self.len());
        for (_, cluster) in self.handles() {
            summaries.push(cluster.lock().await.summary());
        }
        summaries
    }

    /// Synchronize every cluster; failures are returned per cluster name.
    pub async fn synchronize_all(&self, ipvs: &Ipvs) -> Vec<(String, IpvsError)> {
        let mut failures = Vec::new();
        for (name, cluster) in self.handles() {
            if let Err(e) = cluster.lock().await.synchronize(ipvs).await {
                error!(cluster = %name, error = %e, "Synchronize failed");
                failures.push((name, e));
            }
        }
        failures
    }

    /// Replace the managed clusters with a freshly loaded set.
    ///
    /// A new cluster equal to an existing one (same fwmark) inherits its
    /// monitoring state, is synchronized, and then takes the old one's place
    /// inside the same handle, so a pass already holding that handle works on
    /// the new cluster. Existing clusters without a counterpart are stopped
    /// and dropped; one whose stop fails stays until a later reload stops it.
    pub async fn reconfigure(
        &self,
        new_clusters: Vec<Cluster>,
        ipvs: &Ipvs,
    ) -> Vec<(String, IpvsError)> {
        let mut failures = Vec::new();
        let existing = self.handles();
        let mut retained = HashSet::new();

        for (name, handle) in &existing {
            let mut cluster = handle.lock().await;
            if new_clusters.iter().any(|c| *c == *cluster) {
                continue;
            }
            match cluster.stop_monitoring(ipvs).await {
                Ok(()) => {
                    info!(cluster = %cluster, "Cluster removed from configuration");
                    drop(cluster);
                    self.clusters.remove(name);
                }
                Err(e) => {
                    error!(
                        cluster = %cluster,
                        error = %e,
                        "Failed to stop removed cluster, keeping it until the next reload"
                    );
                    retained.insert(name.clone());
                    failures.push((name.clone(), e));
                }
            }
        }

        for mut cluster in new_clusters {
            let name = cluster.name().to_string();
            if retained.contains(&name) {
                let e = IpvsError::Configuration(format!(
                    "cluster {} still owns a service that could not be stopped",
                    name
                ));
                error!(cluster = %cluster, error = %e, "Skipping reconfigured cluster");
                failures.push((name, e));
                continue;
            }

            let mut reused = None;
            for (old_name, handle) in existing.iter().filter(|(n, _)| !retained.contains(n)) {
                if handle.lock().await.fwmark() == cluster.fwmark() {
                    reused = Some((old_name.clone(), handle.clone()));
                    break;
                }
            }

            let handle = match reused {
                Some((old_name, handle)) => {
                    let mut current = handle.lock().await;
                    cluster.incorporate_state(&current);
                    if let Err(e) = cluster.synchronize(ipvs).await {
                        error!(cluster = %cluster, error = %e, "Synchronize failed after reconfigure");
                        failures.push((name.clone(), e));
                    }
                    *current = cluster;
                    drop(current);
                    if old_name != name {
                        self.clusters.remove(&old_name);
                    }
                    handle
                }
                None => {
                    if let Err(e) = cluster.synchronize(ipvs).await {
                        error!(cluster = %cluster, error = %e, "Synchronize failed after reconfigure");
                        failures.push((name.clone(), e));
                    }
                    Arc::new(Mutex::new(cluster))
                }
            };

            self.clusters.insert(name, handle);
        }

        failures
    }
}
