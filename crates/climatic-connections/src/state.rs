//! Connection lifecycle state machine

use crate::ConnectionError;
use serde::Serialize;
use std::fmt;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Constructed, `connect` not yet called
    #[default]
    Uninitialized,
    /// Spawning the transport process
    Connecting,
    /// Terminal handle attached
    Connected,
    /// Teardown in progress
    Disconnecting,
    /// Torn down; `connect` may be called again
    Disconnected,
    /// The last `connect` failed; `connect` may be retried
    Failed,
}

impl ConnectionState {
    /// Whether `connect` is allowed from this state
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Disconnected | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Transition guard shared by the concrete transports
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    state: ConnectionState,
}

impl Lifecycle {
    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    /// Enter `Connecting`, rejecting re-entrant connects
    pub(crate) fn begin_connect(&mut self) -> Result<(), ConnectionError> {
        if !self.state.can_connect() {
            return Err(ConnectionError::InvalidState {
                operation: "connect",
                state: self.state,
            });
        }
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// Settle a connect attempt into `Connected` or `Failed`
    pub(crate) fn finish_connect<T>(
        &mut self,
        result: Result<T, ConnectionError>,
    ) -> Result<T, ConnectionError> {
        self.state = if result.is_ok() {
            ConnectionState::Connected
        } else {
            ConnectionState::Failed
        };
        result
    }

    pub(crate) fn begin_disconnect(&mut self) {
        self.state = ConnectionState::Disconnecting;
    }

    pub(crate) fn finish_disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
    }
}
