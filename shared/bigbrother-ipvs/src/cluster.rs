//! Cluster reconciliation
//!
//! A cluster is one fwmark service in IPVS plus the nodes behind it. It moves
//! between unmonitored and monitored, turns node health into weights, fails
//! over to the downpage when nothing is healthy, and adopts services that are
//! already running when the daemon starts.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::info;

use crate::health::HealthFetcher;
use crate::ipvs::{Ipvs, DOWNPAGE_ADDRESS, DOWNPAGE_WEIGHT, INITIAL_WEIGHT};
use crate::node::{ClusterContext, Node};
use crate::status::StatusOverride;
use crate::types::*;

/// Cluster definition as read from the cluster file
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    pub fwmark: Option<Fwmark>,
    pub scheduler: Option<String>,
    /// Seconds between health passes.
    pub check_interval: Option<u64>,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub address: String,
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_path() -> String {
    "/".to_string()
}

impl From<NodeConfig> for Node {
    fn from(config: NodeConfig) -> Self {
        Node::new(config.address, config.port).with_path(config.path)
    }
}

#[derive(Debug, Clone)]
pub struct Cluster {
    name: String,
    fwmark: Fwmark,
    scheduler: String,
    check_interval: Duration,
    nodes: Vec<Node>,
    monitored: bool,
    needs_check: bool,
    downpage_enabled: bool,
    last_check_at: Option<Instant>,
    last_checked: Option<DateTime<Utc>>,
}

impl Cluster {
    pub fn new(
        name: impl Into<String>,
        fwmark: Fwmark,
        scheduler: impl Into<String>,
        check_interval: Duration,
        nodes: Vec<Node>,
    ) -> Self {
        let mut cluster = Self {
            name: name.into(),
            fwmark,
            scheduler: scheduler.into(),
            check_interval,
            nodes: Vec::new(),
            monitored: false,
            needs_check: false,
            downpage_enabled: false,
            last_check_at: None,
            last_checked: None,
        };
        for node in nodes {
            cluster.push_node(node);
        }
        cluster
    }

    /// Build a cluster from its file entry. `default_interval` applies when
    /// the entry has no `check_interval` of its own.
    pub fn from_config(name: &str, config: ClusterConfig, default_interval: Duration) -> Result<Self> {
        let fwmark = config
            .fwmark
            .ok_or_else(|| IpvsError::Configuration(format!("cluster {} has no fwmark", name)))?;
        let scheduler = config
            .scheduler
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| IpvsError::Configuration(format!("cluster {} has no scheduler", name)))?;
        let check_interval = config
            .check_interval
            .map(Duration::from_secs)
            .unwrap_or(default_interval);

        Ok(Self::new(
            name,
            fwmark,
            scheduler,
            check_interval,
            config.nodes.into_iter().map(Node::from).collect(),
        ))
    }

    // Nodes are keyed by address; a later duplicate replaces the earlier one.
    fn push_node(&mut self, node: Node) {
        match self.nodes.iter_mut().find(|n| n.address() == node.address()) {
            Some(existing) => *existing = node,
            None => self.nodes.push(node),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fwmark(&self) -> Fwmark {
        self.fwmark
    }

    pub fn scheduler(&self) -> &str {
        &self.scheduler
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn monitored(&self) -> bool {
        self.monitored
    }

    pub fn downpage_enabled(&self) -> bool {
        self.downpage_enabled
    }

    /// Register the service and start a fresh monitoring session.
    pub async fn start_monitoring(&mut self, ipvs: &Ipvs) -> Result<()> {
        if self.monitored {
            return Ok(());
        }

        ipvs.start_cluster(self.fwmark, &self.scheduler).await?;
        info!(cluster = %self, "Started monitoring");

        self.invalidate_weights();
        self.monitored = true;
        self.needs_check = true;
        Ok(())
    }

    /// Remove the service and forget everything applied to it.
    pub async fn stop_monitoring(&mut self, ipvs: &Ipvs) -> Result<()> {
        if !self.monitored {
            return Ok(());
        }

        ipvs.stop_cluster(self.fwmark).await?;
        info!(cluster = %self, "Stopped monitoring");

        self.invalidate_weights();
        self.downpage_enabled = false;
        self.monitored = false;
        Ok(())
    }

    /// Join a service that is already configured in IPVS.
    pub fn resume_monitoring(&mut self) {
        if !self.monitored {
            info!(cluster = %self, "Resumed monitoring");
        }
        self.monitored = true;
    }

    /// Never true for an unmonitored cluster.
    pub fn needs_check(&self) -> bool {
        if !self.monitored {
            return false;
        }
        self.needs_check
            || self
                .last_check_at
                .map_or(true, |at| at.elapsed() >= self.check_interval)
    }

    /// One health pass: refresh every node, then settle the downpage.
    pub async fn monitor_nodes(&mut self, ipvs: &Ipvs, health: &dyn HealthFetcher) -> Result<()> {
        self.needs_check = false;
        self.last_check_at = Some(Instant::now());
        self.last_checked = Some(Utc::now());

        let context = ClusterContext {
            name: &self.name,
            fwmark: self.fwmark,
            monitored: self.monitored,
        };
        for node in self.nodes.iter_mut() {
            node.monitor(context, ipvs, health).await?;
        }

        if self.monitored {
            self.settle_downpage(ipvs).await?;
        }
        Ok(())
    }

    async fn settle_downpage(&mut self, ipvs: &Ipvs) -> Result<()> {
        let all_down = self.nodes.iter().all(|n| !n.is_up());

        if all_down && !self.downpage_enabled {
            ipvs.start_node(self.fwmark, DOWNPAGE_ADDRESS, DOWNPAGE_WEIGHT).await?;
            self.downpage_enabled = true;
            info!(cluster = %self, "All nodes down, downpage enabled");
        } else if !all_down && self.downpage_enabled {
            ipvs.stop_node(self.fwmark, DOWNPAGE_ADDRESS).await?;
            self.downpage_enabled = false;
            info!(cluster = %self, "Cluster recovered, downpage disabled");
        }
        Ok(())
    }

    /// Adopt the running service for this fwmark, if any, and make its real
    /// servers match the configured nodes. Entries present on both sides are
    /// left alone. A downpage entry is kept and becomes the downpage state,
    /// unless a configured node owns that address.
    pub async fn synchronize(&mut self, ipvs: &Ipvs) -> Result<()> {
        let running = ipvs.running_configuration().await?;
        let Some(running_nodes) = running.get(&self.fwmark) else {
            info!(cluster = %self, "Service not running, leaving unmonitored");
            return Ok(());
        };

        self.resume_monitoring();

        let desired: HashSet<&str> = self.nodes.iter().map(|n| n.address()).collect();
        let present: HashSet<&str> = running_nodes.iter().map(String::as_str).collect();

        self.downpage_enabled =
            present.contains(DOWNPAGE_ADDRESS) && !desired.contains(DOWNPAGE_ADDRESS);

        let mut removed = 0usize;
        let stale = running_nodes
            .iter()
            .filter(|a| a.as_str() != DOWNPAGE_ADDRESS && !desired.contains(a.as_str()));
        for address in stale {
            ipvs.stop_node(self.fwmark, address).await?;
            removed += 1;
        }

        let mut added = 0usize;
        for node in self.nodes.iter_mut() {
            if present.contains(node.address()) {
                continue;
            }
            ipvs.start_node(self.fwmark, node.address(), INITIAL_WEIGHT).await?;
            node.record_weight(INITIAL_WEIGHT);
            added += 1;
        }

        info!(
            cluster = %self,
            added,
            removed,
            downpage = self.downpage_enabled,
            "Synchronized with running configuration"
        );
        Ok(())
    }

    /// Carry monitoring state over from the instance this one replaces.
    pub fn incorporate_state(&mut self, previous: &Cluster) {
        self.monitored = previous.monitored;
        self.needs_check = previous.needs_check;
        self.downpage_enabled = previous.downpage_enabled;
        self.last_check_at = previous.last_check_at;
        self.last_checked = previous.last_checked;

        for node in self.nodes.iter_mut() {
            if let Some(old) = previous.nodes.iter().find(|n| n.address() == node.address()) {
                node.incorporate_state(old);
            }
        }
    }

    pub async fn up_file_exists(&self, overrides: &dyn StatusOverride) -> bool {
        overrides.exists(StatusKind::Up, &self.name).await
    }

    pub async fn down_file_exists(&self, overrides: &dyn StatusOverride) -> bool {
        overrides.exists(StatusKind::Down, &self.name).await
    }

    pub async fn override_status(&self, overrides: &dyn StatusOverride) -> OverrideStatus {
        overrides.override_status(&self.name).await
    }

    pub fn summary(&self) -> ClusterSummary {
        ClusterSummary {
            name: self.name.clone(),
            fwmark: self.fwmark,
            scheduler: self.scheduler.clone(),
            monitored: self.monitored,
            downpage_enabled: self.downpage_enabled,
            last_checked: self.last_checked,
            nodes: self.nodes.clone(),
        }
    }

    fn invalidate_weights(&mut self) {
        for node in self.nodes.iter_mut() {
            node.invalidate_weight();
        }
    }
}

impl PartialEq for Cluster {
    fn eq(&self, other: &Self) -> bool {
        self.fwmark == other.fwmark
    }
}

impl Eq for Cluster {}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.fwmark)
    }
}

/// Serializable view of a cluster
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub name: String,
    pub fwmark: Fwmark,
    pub scheduler: String,
    pub monitored: bool,
    pub downpage_enabled: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub nodes: Vec<Node>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(name: &str, fwmark: u32) -> Cluster {
        Cluster::new(name, Fwmark(fwmark), "wrr", Duration::from_secs(60), Vec::new())
    }

    #[test]
    fn test_display_is_name_and_fwmark() {
        assert_eq!(cluster("name", 100).to_string(), "name (100)");
    }

    #[test]
    fn test_equality_is_by_fwmark() {
        let a = cluster("first", 100);
        let b = Cluster::new(
            "second",
            Fwmark(100),
            "rr",
            Duration::from_secs(5),
            vec![Node::new("10.0.0.1", 80)],
        );
        let c = cluster("first", 200);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_duplicate_addresses_collapse() {
        let cluster = Cluster::new(
            "dupes",
            Fwmark(1),
            "wrr",
            Duration::from_secs(1),
            vec![
                Node::new("10.0.0.1", 80),
                Node::new("10.0.0.1", 81),
                Node::new("10.0.0.2", 80),
            ],
        );

        assert_eq!(cluster.nodes().len(), 2);
        assert_eq!(cluster.nodes()[0].port(), 81);
    }

    #[test]
    fn test_from_config_requires_fwmark_and_scheduler() {
        let missing_fwmark = ClusterConfig {
            fwmark: None,
            scheduler: Some("wrr".to_string()),
            check_interval: None,
            nodes: Vec::new(),
        };
        let err = Cluster::from_config("a", missing_fwmark, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, IpvsError::Configuration(_)));

        let missing_scheduler = ClusterConfig {
            fwmark: Some(Fwmark(1)),
            scheduler: None,
            check_interval: None,
            nodes: Vec::new(),
        };
        let err = Cluster::from_config("a", missing_scheduler, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, IpvsError::Configuration(_)));
    }

    #[test]
    fn test_from_config_builds_nodes() {
        let config = ClusterConfig {
            fwmark: Some(Fwmark(3)),
            scheduler: Some("wrr".to_string()),
            check_interval: Some(5),
            nodes: vec![NodeConfig {
                address: "10.0.0.9".to_string(),
                port: 9001,
                path: "/status".to_string(),
            }],
        };
        let cluster = Cluster::from_config("web", config, Duration::from_secs(1)).unwrap();

        assert_eq!(cluster.fwmark(), Fwmark(3));
        assert_eq!(cluster.check_interval, Duration::from_secs(5));
        assert_eq!(cluster.nodes()[0].path(), "/status");
        assert!(!cluster.monitored());
        assert!(!cluster.needs_check());
    }

    #[test]
    fn test_resume_monitoring_makes_check_due() {
        let mut cluster = cluster("resume", 1);
        assert!(!cluster.needs_check());

        cluster.resume_monitoring();
        assert!(cluster.monitored());
        assert!(cluster.needs_check());
    }
}
