//! Test doubles for the IPVS executor and the health source

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigbrother_ipvs::{
    Cluster, CommandExecutor, Fwmark, HealthFetcher, Ipvs, IpvsError, Node, Result,
    RunningConfiguration,
};
use tokio::sync::Mutex;

/// Records every mutating command and serves a canned service table
#[derive(Default)]
pub struct RecordingExecutor {
    commands: Mutex<Vec<String>>,
    running: Mutex<RunningConfiguration>,
    fail_prefix: Mutex<Option<String>>,
}

impl RecordingExecutor {
    pub async fn commands(&self) -> Vec<String> {
        self.commands.lock().await.clone()
    }

    pub async fn last(&self) -> Option<String> {
        self.commands.lock().await.last().cloned()
    }

    pub async fn clear(&self) {
        self.commands.lock().await.clear();
    }

    pub async fn set_running(&self, services: &[(u32, &[&str])]) {
        let mut running = self.running.lock().await;
        running.clear();
        for (fwmark, addresses) in services {
            running.insert(
                Fwmark(*fwmark),
                addresses.iter().map(|a| a.to_string()).collect(),
            );
        }
    }

    /// Commands starting with `prefix` fail until cleared with `None`.
    pub async fn fail_commands_starting_with(&self, prefix: Option<&str>) {
        *self.fail_prefix.lock().await = prefix.map(str::to_string);
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn run(&self, command: &str) -> Result<String> {
        if let Some(prefix) = self.fail_prefix.lock().await.as_deref() {
            if command.starts_with(prefix) {
                return Err(IpvsError::Execution {
                    command: command.to_string(),
                    message: "exit status: 2".to_string(),
                });
            }
        }
        self.commands.lock().await.push(command.to_string());
        Ok(String::new())
    }

    async fn running_configuration(&self) -> Result<RunningConfiguration> {
        Ok(self.running.lock().await.clone())
    }
}

/// Reports the same settable score for every node
pub struct StubHealth {
    score: AtomicU32,
    failing: AtomicBool,
}

impl StubHealth {
    pub fn new(score: u32) -> Self {
        Self {
            score: AtomicU32::new(score),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set(&self, score: u32) {
        self.score.store(score, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl HealthFetcher for StubHealth {
    async fn current_health(&self, node: &Node) -> Result<u32> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(IpvsError::HealthCheck {
                address: node.address().to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(self.score.load(Ordering::SeqCst))
    }
}

pub fn ipvs() -> (Arc<RecordingExecutor>, Ipvs) {
    let executor = Arc::new(RecordingExecutor::default());
    let ipvs = Ipvs::new(executor.clone());
    (executor, ipvs)
}

pub fn node(address: &str) -> Node {
    Node::new(address, 9001).with_path("/test/valid")
}

pub fn cluster(name: &str, fwmark: u32, addresses: &[&str]) -> Cluster {
    Cluster::new(
        name,
        Fwmark(fwmark),
        "wrr",
        Duration::from_secs(60),
        addresses.iter().map(|a| node(a)).collect(),
    )
}
