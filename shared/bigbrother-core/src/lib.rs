//! BigBrother Core - shared service infrastructure for the IPVS daemon
//!
//! This crate provides:
//! - The service trait the daemon implements
//! - Runtime bootstrap with signal handling (shutdown and reload)
//! - Error handling utilities
//! - Configuration management

pub mod config;
pub mod error;
pub mod service;

pub use config::ServiceConfig;
pub use error::{BigBrotherError, Result};
pub use service::{BigBrotherService, DaemonRuntime, HealthStatus};
