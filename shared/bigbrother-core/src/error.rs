//! Error types for the BigBrother daemon

use bigbrother_ipvs::IpvsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BigBrotherError>;

#[derive(Error, Debug)]
pub enum BigBrotherError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] IpvsError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BigBrotherError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Config(_) => 400,
            _ => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Reconcile(IpvsError::Execution { .. }) => "EXECUTION_ERROR",
            Self::Reconcile(_) => "RECONCILE_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
