//! Connection error types

use crate::ConnectionState;
use std::io;
use thiserror::Error;

/// Errors raised while configuring or driving a connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Invalid connection parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The transport process could not be started
    #[error("Failed to spawn `{command}`: {message}")]
    Spawn {
        /// Command line that failed to start
        command: String,
        /// Underlying failure
        message: String,
    },

    /// Pseudo-terminal allocation or control failed
    #[error("PTY error: {0}")]
    Pty(String),

    /// Lifecycle operation not allowed in the current state
    #[error("Cannot {operation} while connection is {state}")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// State the connection was in
        state: ConnectionState,
    },

    /// I/O error on the terminal or transcript
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<serde_json::Error> for ConnectionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(format!("invalid JSON configuration: {}", err))
    }
}
