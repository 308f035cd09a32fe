//! IPVS Reconciliation Library
//!
//! Keeps an IPVS fwmark service per cluster in line with the measured health
//! of its nodes: node weights follow health scores, a downpage takes over when
//! every node is down, and `synchronize` adopts services left behind by a
//! previous run.

pub mod cluster;
pub mod collection;
pub mod health;
pub mod ipvs;
pub mod node;
pub mod status;
pub mod types;

pub use cluster::{Cluster, ClusterConfig, ClusterSummary, NodeConfig};
pub use collection::ClusterCollection;
pub use health::{HealthFetcher, HttpHealthFetcher, OverrideHealth};
pub use ipvs::{CommandExecutor, Ipvs, IpvsCommand, ShellExecutor};
pub use node::Node;
pub use status::{FileStatusOverride, StatusFile, StatusOverride};
pub use types::*;
