//! Test doubles shared by the daemon's unit tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigbrother_ipvs::{
    Cluster, CommandExecutor, Fwmark, HealthFetcher, Ipvs, IpvsError, Node, Result,
    RunningConfiguration, StatusKind, StatusOverride,
};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct Recorder {
    commands: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
}

impl Recorder {
    pub fn ipvs() -> (Arc<Recorder>, Ipvs) {
        let recorder = Arc::new(Recorder::default());
        let ipvs = Ipvs::new(recorder.clone());
        (recorder, ipvs)
    }

    pub async fn commands(&self) -> Vec<String> {
        self.commands.lock().await.clone()
    }

    /// Fail every command containing `needle`.
    pub async fn fail_on(&self, needle: &str) {
        *self.fail_on.lock().await = Some(needle.to_string());
    }
}

#[async_trait]
impl CommandExecutor for Recorder {
    async fn run(&self, command: &str) -> Result<String> {
        if let Some(needle) = self.fail_on.lock().await.as_deref() {
            if command.contains(needle) {
                return Err(IpvsError::Execution {
                    command: command.to_string(),
                    message: "exit status: 1".to_string(),
                });
            }
        }
        self.commands.lock().await.push(command.to_string());
        Ok(String::new())
    }

    async fn running_configuration(&self) -> Result<RunningConfiguration> {
        Ok(RunningConfiguration::new())
    }
}

pub struct FixedHealth(pub u32);

#[async_trait]
impl HealthFetcher for FixedHealth {
    async fn current_health(&self, _node: &Node) -> Result<u32> {
        Ok(self.0)
    }
}

pub struct NoOverrides;

#[async_trait]
impl StatusOverride for NoOverrides {
    async fn exists(&self, _kind: StatusKind, _name: &str) -> bool {
        false
    }
}

pub fn cluster(name: &str, fwmark: u32, addresses: &[&str]) -> Cluster {
    Cluster::new(
        name,
        Fwmark(fwmark),
        "wrr",
        Duration::from_secs(60),
        addresses.iter().map(|a| Node::new(*a, 80)).collect(),
    )
}
