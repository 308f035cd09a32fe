//! Shared IPVS types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Firewall mark keying an IPVS virtual service.
///
/// Configuration and `ipvsadm` output may carry the mark as a number or as a
/// string; both parse to the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawFwmark", into = "u32")]
pub struct Fwmark(pub u32);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFwmark {
    Number(u32),
    Text(String),
}

impl TryFrom<RawFwmark> for Fwmark {
    type Error = IpvsError;

    fn try_from(raw: RawFwmark) -> Result<Self> {
        match raw {
            RawFwmark::Number(n) => Ok(Fwmark(n)),
            RawFwmark::Text(s) => s.parse(),
        }
    }
}

impl From<u32> for Fwmark {
    fn from(value: u32) -> Self {
        Fwmark(value)
    }
}

impl From<Fwmark> for u32 {
    fn from(value: Fwmark) -> Self {
        value.0
    }
}

impl FromStr for Fwmark {
    type Err = IpvsError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse()
            .map(Fwmark)
            .map_err(|e| IpvsError::Parse(format!("invalid fwmark {:?}: {}", s, e)))
    }
}

impl fmt::Display for Fwmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live service table: fwmark to real-server addresses, in `ipvsadm` order.
pub type RunningConfiguration = BTreeMap<Fwmark, Vec<String>>;

/// Marker kinds an operator can drop for a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Up,
    Down,
}

impl StatusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Up => "up",
            StatusKind::Down => "down",
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator override in effect for a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideStatus {
    #[default]
    None,
    ForcedUp,
    ForcedDown,
}

/// Reconciliation errors
#[derive(Debug, thiserror::Error)]
pub enum IpvsError {
    #[error("command `{command}` failed: {message}")]
    Execution { command: String, message: String },

    #[error("health check of {address} failed: {message}")]
    HealthCheck { address: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IpvsError>;
