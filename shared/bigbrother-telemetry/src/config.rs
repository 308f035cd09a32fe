//! Telemetry Configuration

use tracing_subscriber::EnvFilter;

use crate::TelemetryError;

/// Logging settings handed over by the service configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Filter directives used when `RUST_LOG` is unset, e.g. `info` or
    /// `info,bigbrother_ipvs=debug`.
    pub log_level: String,
    pub json_logs: bool,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>, log_level: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            log_level: log_level.into(),
            json_logs: false,
        }
    }

    pub fn with_json_logs(mut self, json_logs: bool) -> Self {
        self.json_logs = json_logs;
        self
    }

    /// `RUST_LOG` when set, otherwise the configured level.
    pub(crate) fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => self.level_filter(),
        }
    }

    fn level_filter(&self) -> Result<EnvFilter, TelemetryError> {
        EnvFilter::try_new(&self.log_level).map_err(|e| TelemetryError::InvalidLogLevel {
            level: self.log_level.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_carries_service_settings() {
        let config = TelemetryConfig::new("bigbrother", "debug").with_json_logs(true);
        assert_eq!(config.service_name, "bigbrother");
        assert_eq!(config.log_level, "debug");
        assert!(config.json_logs);
        assert!(!TelemetryConfig::new("bigbrother", "info").json_logs);
    }

    #[test]
    fn test_level_filter_accepts_directives() {
        let config = TelemetryConfig::new("bigbrother", "warn,bigbrother_ipvs=debug");
        let filter = config.level_filter().unwrap();
        assert!(filter.to_string().contains("bigbrother_ipvs=debug"));
    }

    #[test]
    fn test_level_filter_rejects_unknown_level() {
        let config = TelemetryConfig::new("bigbrother", "bigbrother=loud");
        let err = config.level_filter().unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidLogLevel { ref level, .. } if level == "bigbrother=loud"));
    }
}
