//! Unified application error type for the command-line front end.

use crate::config::ConfigError;
use crate::port::PortError;
use thiserror::Error;

/// A specialized `Result` type for the binary.
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Port(#[from] PortError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("An I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("A serialization error occurred: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

impl AppError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Port(PortError::NotFound(_)) => 2,
            Self::Port(PortError::Busy(_)) => 3,
            Self::Port(PortError::PermissionDenied(_)) => 4,
            Self::Config(_) => 78,
            _ => 1,
        }
    }
}
