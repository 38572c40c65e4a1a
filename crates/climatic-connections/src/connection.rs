//! Connection lifecycle contract

use crate::{ConnectionError, ConnectionState, Terminal, Transcript};
use serde::Serialize;
use std::fmt;
use tracing::Dispatch;

/// Lifecycle every transport implements
///
/// A successful [`connect`](Connection::connect) attaches a [`Terminal`] that
/// the caller drives through an expect engine. [`disconnect`](Connection::disconnect)
/// marks the end of the session.
///
/// The optional `logger` receives the lifecycle's debug lines. Passing `None`
/// silences them; it is never an error.
pub trait Connection: fmt::Debug + Send {
    /// Establish the session and attach its terminal
    ///
    /// `logfile` receives a verbatim copy of everything written to and read
    /// from the terminal. Fails with [`ConnectionError::InvalidState`] if the
    /// connection is already connecting or connected.
    fn connect(&mut self, logfile: Transcript, logger: Option<&Dispatch>) -> Result<(), ConnectionError>;

    /// Tear the session down
    fn disconnect(&mut self, logger: Option<&Dispatch>) -> Result<(), ConnectionError>;

    /// Current lifecycle state
    fn state(&self) -> ConnectionState;

    /// Terminal attached by the last successful connect
    fn terminal(&self) -> Option<&Terminal>;

    /// Mutable access to the attached terminal
    fn terminal_mut(&mut self) -> Option<&mut Terminal>;

    /// Detach the terminal, handing ownership to the caller
    fn take_terminal(&mut self) -> Option<Terminal>;

    /// Descriptive snapshot of the target
    fn connection_info(&self) -> ConnectionInfo;

    /// Whether the connection is in the `Connected` state
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

/// Connection information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Remote hostname or IP, or the local program
    pub host: String,
    /// Remote port
    pub port: Option<u16>,
    /// Login user
    pub username: Option<String>,
    /// Connection type
    pub transport_type: TransportType,
}

/// Transport type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// SSH client subprocess
    Ssh,
    /// Local process
    Local,
}

/// Run `emit` with `logger` as the active dispatcher, if one was supplied
pub(crate) fn with_logger(logger: Option<&Dispatch>, emit: impl FnOnce()) {
    if let Some(dispatch) = logger {
        tracing::dispatcher::with_default(dispatch, emit);
    }
}
