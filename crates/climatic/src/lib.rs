//! # Climatic
//!
//! Uniform interactive CLI sessions with network devices.
//!
//! A transport (SSH, or a local process) is spawned on a pseudo-terminal
//! sized 24x500 so device output does not wrap. The resulting
//! [`Terminal`] is handed to whatever expect engine drives the session.
//!
//! ```no_run
//! use climatic::{Connection, SshConfig, SshConnection, Transcript};
//!
//! # fn main() -> climatic::Result<()> {
//! let config = SshConfig::new("192.168.33.4", "admin")
//!     .with_ciphers(["blowfish-cbc", "3des-cbc"]);
//! let mut connection = SshConnection::new(config)?;
//! connection.connect(Transcript::file("session.log")?, None)?;
//! // ... drive connection.terminal_mut() until the device logs out ...
//! connection.disconnect(None)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use climatic_connections as connections;

/// Error types for the Climatic library
pub mod error;

/// Transport-agnostic configuration
pub mod config;

pub use climatic_connections::{
    CommandLine, Connection, ConnectionInfo, ConnectionState, LocalConfig, LocalConnection, SshConfig,
    SshConnection, Terminal, Transcript, TransportType, WindowSize,
};
pub use config::ConnectionConfig;
pub use error::ClimaticError;

/// Result type alias for Climatic operations
pub type Result<T> = std::result::Result<T, ClimaticError>;
