//! Configuration management for the daemon

use crate::error::{BigBrotherError, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    pub http_bind: String,
    /// YAML file holding the cluster definitions.
    pub config_path: PathBuf,
    /// Root directory of the up/down marker files.
    pub status_dir: PathBuf,
    pub tick_interval: Duration,
    /// Used for clusters that do not set their own `check_interval`.
    pub check_interval: Duration,
    pub command_timeout: Duration,
    pub health_timeout: Duration,
    /// Filter directives for the log subscriber, overridden by `RUST_LOG`.
    pub log_level: String,
    pub json_logs: bool,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "bigbrother".to_string()),
            http_bind: env::var("HTTP_BIND").unwrap_or_else(|_| "0.0.0.0:9292".to_string()),
            config_path: env::var("BIGBROTHER_CONFIG")
                .unwrap_or_else(|_| "/etc/bigbrother/clusters.yml".to_string())
                .into(),
            status_dir: env::var("BIGBROTHER_STATUS_DIR")
                .unwrap_or_else(|_| "/etc/bigbrother/status".to_string())
                .into(),
            tick_interval: Duration::from_millis(parse_var("TICK_INTERVAL_MS", 1000)?),
            check_interval: Duration::from_secs(parse_var("CHECK_INTERVAL_SECS", 1)?),
            command_timeout: Duration::from_secs(parse_var("COMMAND_TIMEOUT_SECS", 10)?),
            health_timeout: Duration::from_secs(parse_var("HEALTH_TIMEOUT_SECS", 2)?),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            json_logs: parse_flag("JSON_LOGS")?,
        })
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| BigBrotherError::Config(format!("Invalid {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

fn parse_flag(key: &str) -> Result<bool> {
    let Ok(raw) = env::var(key) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "" | "0" | "false" | "no" => Ok(false),
        other => Err(BigBrotherError::Config(format!(
            "Invalid {}: expected true or false, got {:?}",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_falls_back_to_default() {
        let value: u64 = parse_var("BIGBROTHER_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("BIGBROTHER_TEST_BAD_NUMBER", "ten");
        let err = parse_var::<u64>("BIGBROTHER_TEST_BAD_NUMBER", 1).unwrap_err();
        assert!(matches!(err, BigBrotherError::Config(_)));
        env::remove_var("BIGBROTHER_TEST_BAD_NUMBER");
    }

    #[test]
    fn test_parse_flag() {
        assert!(!parse_flag("BIGBROTHER_TEST_UNSET_FLAG").unwrap());

        env::set_var("BIGBROTHER_TEST_JSON_FLAG", "TRUE");
        assert!(parse_flag("BIGBROTHER_TEST_JSON_FLAG").unwrap());
        env::set_var("BIGBROTHER_TEST_JSON_FLAG", "0");
        assert!(!parse_flag("BIGBROTHER_TEST_JSON_FLAG").unwrap());
        env::set_var("BIGBROTHER_TEST_JSON_FLAG", "sometimes");
        let err = parse_flag("BIGBROTHER_TEST_JSON_FLAG").unwrap_err();
        assert!(matches!(err, BigBrotherError::Config(_)));
        env::remove_var("BIGBROTHER_TEST_JSON_FLAG");
    }
}
