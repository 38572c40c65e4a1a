//! # Climatic Connections
//!
//! Connection lifecycle for interactive device CLIs. A [`Connection`] spawns
//! a transport process on a pseudo-terminal and hands back a [`Terminal`]
//! for an expect engine to drive.

#![warn(missing_docs)]

/// Lifecycle contract shared by all transports
pub mod connection;

/// Lifecycle state machine
pub mod state;

/// Subprocess command lines
pub mod command;

/// PTY handles and transcripts
pub mod terminal;

/// Terminal spawning seam
pub mod spawner;

/// SSH transport
pub mod ssh;

/// Local process transport
pub mod local;

/// Connection error types
pub mod error;

#[cfg(test)]
pub(crate) mod test_utils;

pub use command::CommandLine;
pub use connection::{Connection, ConnectionInfo, TransportType};
pub use error::ConnectionError;
pub use local::{LocalConfig, LocalConnection, DEFAULT_LOCAL_PROGRAM};
pub use portable_pty::ExitStatus;
pub use spawner::{PtySpawner, TerminalSpawner};
pub use ssh::{parse_algorithm_list, SshConfig, SshConnection, DEFAULT_SSH_BINARY, DEFAULT_SSH_PORT};
pub use state::ConnectionState;
pub use terminal::{Terminal, Transcript, WindowSize, WINDOW_COLS, WINDOW_ROWS};
