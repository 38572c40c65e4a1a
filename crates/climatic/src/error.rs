//! Error types for the Climatic library

use climatic_connections::ConnectionError;
use thiserror::Error;

/// Main error type for Climatic operations
#[derive(Debug, Error)]
pub enum ClimaticError {
    /// Invalid connection configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport process could not be started
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// Pseudo-terminal errors
    #[error("Terminal error: {0}")]
    Terminal(String),

    /// Lifecycle misuse
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConnectionError> for ClimaticError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Configuration(msg) => Self::Configuration(msg),
            err @ ConnectionError::Spawn { .. } => Self::Spawn(err.to_string()),
            ConnectionError::Pty(msg) => Self::Terminal(msg),
            err @ ConnectionError::InvalidState { .. } => Self::Lifecycle(err.to_string()),
            ConnectionError::Io(e) => Self::Io(e),
        }
    }
}

impl From<serde_json::Error> for ClimaticError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(format!("JSON error: {}", err))
    }
}
