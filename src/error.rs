//! Error types for Idlewatch

use thiserror::Error;

use crate::runtime::RuntimeError;

#[derive(Error, Debug)]
pub enum IdlewatchError {
    /// The monitored container name no longer resolves. Ends monitoring.
    #[error("Container not found: {0}")]
    NotFound(String),

    /// Runtime unreachable, timed out, or returned something unusable.
    /// Absorbed at the tick boundary and retried.
    #[error("Transient runtime error: {0}")]
    Transient(String),

    #[error("Cache cleanup failed: {0}")]
    CleanupFailure(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Security error: {0}")]
    SecurityError(String),

    #[error("Invalid signature pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl IdlewatchError {
    /// Only a vanished container ends the monitor loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IdlewatchError::NotFound(_))
    }
}

impl From<RuntimeError> for IdlewatchError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::NotFound(name) => IdlewatchError::NotFound(name),
            other => IdlewatchError::Transient(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, IdlewatchError>;
