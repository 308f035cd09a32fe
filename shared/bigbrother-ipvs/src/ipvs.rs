//! IPVS command surface
//!
//! Builds `ipvsadm` command lines, hands them to a [`CommandExecutor`] and
//! reads the live service table back.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigbrother_telemetry::ReconcileMetrics;
use tracing::debug;

use crate::types::*;

/// Client affinity held by every service, in seconds
pub const PERSISTENCE_TIMEOUT: u32 = 300;
/// Weight given to nodes added while synchronizing, before their first check
pub const INITIAL_WEIGHT: u32 = 100;
/// Local responder that takes traffic when every node is down
pub const DOWNPAGE_ADDRESS: &str = "127.0.0.1";
pub const DOWNPAGE_WEIGHT: u32 = 1;

const SAVE_COMMAND: &str = "ipvsadm --save --numeric";

/// Runs load balancer commands
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run one command line and return its stdout.
    async fn run(&self, command: &str) -> Result<String>;

    /// Snapshot of the services currently configured in the kernel.
    async fn running_configuration(&self) -> Result<RunningConfiguration> {
        let output = self.run(SAVE_COMMAND).await?;
        Ok(parse_running_configuration(&output))
    }
}

/// A mutating `ipvsadm` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpvsCommand {
    AddService { fwmark: Fwmark, scheduler: String },
    DeleteService { fwmark: Fwmark },
    EditServer { fwmark: Fwmark, address: String, weight: u32 },
    AddServer { fwmark: Fwmark, address: String, weight: u32 },
    DeleteServer { fwmark: Fwmark, address: String },
}

impl fmt::Display for IpvsCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpvsCommand::AddService { fwmark, scheduler } => write!(
                f,
                "ipvsadm --add-service --fwmark-service {} --scheduler {} --persistent {}",
                fwmark, scheduler, PERSISTENCE_TIMEOUT
            ),
            IpvsCommand::DeleteService { fwmark } => {
                write!(f, "ipvsadm --delete-service --fwmark-service {}", fwmark)
            }
            IpvsCommand::EditServer { fwmark, address, weight } => write!(
                f,
                "ipvsadm --edit-server --fwmark-service {} --real-server {} --ipip --weight {}",
                fwmark, address, weight
            ),
            IpvsCommand::AddServer { fwmark, address, weight } => write!(
                f,
                "ipvsadm --add-server --fwmark-service {} --real-server {} --ipip --weight {}",
                fwmark, address, weight
            ),
            IpvsCommand::DeleteServer { fwmark, address } => write!(
                f,
                "ipvsadm --delete-server --fwmark-service {} --real-server {}",
                fwmark, address
            ),
        }
    }
}

/// Handle on the IPVS table used by clusters.
///
/// Cheap to clone; every clone shares the executor and the metrics.
#[derive(Clone)]
pub struct Ipvs {
    executor: Arc<dyn CommandExecutor>,
    metrics: ReconcileMetrics,
}

impl Ipvs {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self::with_metrics(executor, ReconcileMetrics::default())
    }

    pub fn with_metrics(executor: Arc<dyn CommandExecutor>, metrics: ReconcileMetrics) -> Self {
        Self { executor, metrics }
    }

    pub fn metrics(&self) -> &ReconcileMetrics {
        &self.metrics
    }

    pub async fn running_configuration(&self) -> Result<RunningConfiguration> {
        self.executor.running_configuration().await
    }

    pub async fn start_cluster(&self, fwmark: Fwmark, scheduler: &str) -> Result<()> {
        self.issue(IpvsCommand::AddService {
            fwmark,
            scheduler: scheduler.to_string(),
        })
        .await
    }

    pub async fn stop_cluster(&self, fwmark: Fwmark) -> Result<()> {
        self.issue(IpvsCommand::DeleteService { fwmark }).await
    }

    pub async fn edit_node(&self, fwmark: Fwmark, address: &str, weight: u32) -> Result<()> {
        self.issue(IpvsCommand::EditServer {
            fwmark,
            address: address.to_string(),
            weight,
        })
        .await
    }

    pub async fn start_node(&self, fwmark: Fwmark, address: &str, weight: u32) -> Result<()> {
        self.issue(IpvsCommand::AddServer {
            fwmark,
            address: address.to_string(),
            weight,
        })
        .await
    }

    pub async fn stop_node(&self, fwmark: Fwmark, address: &str) -> Result<()> {
        self.issue(IpvsCommand::DeleteServer {
            fwmark,
            address: address.to_string(),
        })
        .await
    }

    async fn issue(&self, command: IpvsCommand) -> Result<()> {
        let line = command.to_string();
        debug!(command = %line, "Issuing IPVS command");

        match self.executor.run(&line).await {
            Ok(_) => {
                self.metrics.commands_issued.inc();
                Ok(())
            }
            Err(e) => {
                self.metrics.commands_failed.inc();
                Err(e)
            }
        }
    }
}

/// Parse `ipvsadm --save --numeric` output.
///
/// `-A -f <mark>` registers a service even when it has no real servers yet;
/// `-a -f <mark> -r <addr>[:port]` appends the address with its port removed.
pub fn parse_running_configuration(output: &str) -> RunningConfiguration {
    let mut services = RunningConfiguration::new();

    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let value_of = |flag: &str| {
            tokens
                .iter()
                .position(|t| *t == flag)
                .and_then(|i| tokens.get(i + 1))
                .copied()
        };

        let Some(fwmark) = value_of("-f").and_then(|f| f.parse::<Fwmark>().ok()) else {
            continue;
        };

        match tokens.first().copied() {
            Some("-A") => {
                services.entry(fwmark).or_default();
            }
            Some("-a") => {
                let Some(server) = value_of("-r") else { continue };
                let address = strip_port(server).to_string();
                let addresses = services.entry(fwmark).or_default();
                if !addresses.contains(&address) {
                    addresses.push(address);
                }
            }
            _ => {}
        }
    }

    services
}

fn strip_port(server: &str) -> &str {
    if let Some(rest) = server.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    server.split(':').next().unwrap_or(server)
}

/// Runs commands as child processes
pub struct ShellExecutor {
    timeout: Duration,
}

impl ShellExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(&self, command: &str) -> Result<String> {
        let failed = |message: String| IpvsError::Execution {
            command: command.to_string(),
            message,
        };

        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| failed("empty command".to_string()))?;

        let child = tokio::process::Command::new(program)
            .args(parts)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| failed(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            return Err(failed(format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_lines() {
        let add = IpvsCommand::AddService {
            fwmark: Fwmark(100),
            scheduler: "wrr".to_string(),
        };
        assert_eq!(
            add.to_string(),
            "ipvsadm --add-service --fwmark-service 100 --scheduler wrr --persistent 300"
        );

        let edit = IpvsCommand::EditServer {
            fwmark: Fwmark(1),
            address: "10.0.0.1".to_string(),
            weight: 0,
        };
        assert_eq!(
            edit.to_string(),
            "ipvsadm --edit-server --fwmark-service 1 --real-server 10.0.0.1 --ipip --weight 0"
        );

        let delete = IpvsCommand::DeleteServer {
            fwmark: Fwmark(1),
            address: "10.0.0.1".to_string(),
        };
        assert_eq!(
            delete.to_string(),
            "ipvsadm --delete-server --fwmark-service 1 --real-server 10.0.0.1"
        );
    }

    #[test]
    fn test_parse_running_configuration() {
        let output = "\
-A -f 1 -s wrr -p 300
-a -f 1 -r 10.0.1.1:0 -i -w 100
-a -f 1 -r 10.0.1.2:0 -i -w 0
-A -f 2 -s wrr -p 300
-A -t 10.0.0.1:80 -s rr
-a -t 10.0.0.1:80 -r 10.0.2.1:80 -m -w 1
-A -f 3 -s wlc -p 300
-a -f 3 -r [fe80::1]:0 -i -w 5
";
        let config = parse_running_configuration(output);

        assert_eq!(config.len(), 3);
        assert_eq!(config[&Fwmark(1)], vec!["10.0.1.1", "10.0.1.2"]);
        assert!(config[&Fwmark(2)].is_empty());
        assert_eq!(config[&Fwmark(3)], vec!["fe80::1"]);
    }

    #[test]
    fn test_parse_empty_table() {
        assert!(parse_running_configuration("").is_empty());
    }

    #[tokio::test]
    async fn test_shell_executor_reports_failures() {
        let executor = ShellExecutor::new(Duration::from_secs(5));

        let err = executor.run("").await.unwrap_err();
        assert!(matches!(err, IpvsError::Execution { .. }));

        let err = executor
            .run("bigbrother-command-that-does-not-exist --flag")
            .await
            .unwrap_err();
        assert!(matches!(err, IpvsError::Execution { .. }));
    }
}
