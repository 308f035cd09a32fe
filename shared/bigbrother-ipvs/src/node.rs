//! Backend node

use serde::Serialize;
use tracing::{debug, warn};

use crate::health::HealthFetcher;
use crate::ipvs::Ipvs;
use crate::types::*;

/// What a node needs to know about the cluster it belongs to
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClusterContext<'a> {
    pub(crate) name: &'a str,
    pub(crate) fwmark: Fwmark,
    pub(crate) monitored: bool,
}

/// One real server of a cluster
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    address: String,
    port: u16,
    path: String,
    /// Weight last sent to IPVS in the current monitoring session.
    weight: Option<u32>,
    last_health: Option<u32>,
}

impl Node {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            path: "/".to_string(),
            weight: None,
            last_health: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn weight(&self) -> Option<u32> {
        self.weight
    }

    pub fn last_health(&self) -> Option<u32> {
        self.last_health
    }

    /// True when the latest check reported a positive score.
    pub fn is_up(&self) -> bool {
        self.last_health.unwrap_or(0) > 0
    }

    /// Forget the applied weight so the next pass re-sends it.
    pub fn invalidate_weight(&mut self) {
        self.weight = None;
    }

    pub(crate) fn record_weight(&mut self, weight: u32) {
        self.weight = Some(weight);
    }

    pub(crate) fn incorporate_state(&mut self, previous: &Node) {
        self.weight = previous.weight;
        self.last_health = previous.last_health;
    }

    /// Refresh health and push a changed weight to IPVS.
    ///
    /// A failed health fetch counts as 0. Weights are only pushed while the
    /// cluster is monitored, and only recorded once IPVS accepted them.
    pub(crate) async fn monitor(
        &mut self,
        cluster: ClusterContext<'_>,
        ipvs: &Ipvs,
        health: &dyn HealthFetcher,
    ) -> Result<()> {
        let current = match health.current_health(self).await {
            Ok(score) => score,
            Err(e) => {
                warn!(
                    cluster = cluster.name,
                    address = %self.address,
                    error = %e,
                    "Health check failed, treating node as down"
                );
                0
            }
        };
        debug!(cluster = cluster.name, address = %self.address, health = current, "Node health");
        self.last_health = Some(current);

        if !cluster.monitored || self.weight == Some(current) {
            return Ok(());
        }

        ipvs.edit_node(cluster.fwmark, &self.address, current).await?;
        self.weight = Some(current);
        Ok(())
    }
}
