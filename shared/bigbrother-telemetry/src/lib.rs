//! BigBrother Telemetry
//!
//! Structured logging setup and the in-process counters the daemon keeps
//! about its reconciliation work.

mod config;
mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{Counter, Gauge, Histogram, MetricsSnapshot, ReconcileMetrics};
pub use tracing_setup::init_tracing;

/// Initialize all telemetry for a service
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    init_tracing(config)
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),

    #[error("Invalid log level {level:?}: {message}")]
    InvalidLogLevel { level: String, message: String },
}
