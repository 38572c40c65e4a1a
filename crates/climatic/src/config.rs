//! Transport-agnostic connection configuration

use crate::Result;
use climatic_connections::{
    Connection, LocalConfig, LocalConnection, SshConfig, SshConnection, Transcript, TransportType,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, Dispatch};

/// Configuration for any supported transport
///
/// Serialized with a `transport` tag:
///
/// ```json
/// { "transport": "ssh", "address": "192.168.33.4", "user": "admin" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// SSH client subprocess
    Ssh(SshConfig),
    /// Local process
    Local(LocalConfig),
}

impl ConnectionConfig {
    /// SSH configuration from a `user@host[:port]` target
    pub fn ssh_target(target: &str) -> Result<Self> {
        Ok(Self::Ssh(SshConfig::from_target(target)?))
    }

    /// Load a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check structural invariants of the selected transport
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Ssh(config) => config.validate()?,
            Self::Local(config) => config.validate()?,
        }
        Ok(())
    }

    /// Selected transport
    pub fn transport_type(&self) -> TransportType {
        match self {
            Self::Ssh(_) => TransportType::Ssh,
            Self::Local(_) => TransportType::Local,
        }
    }

    /// Build an unconnected connection for this configuration
    pub fn build(&self) -> Result<Box<dyn Connection>> {
        debug!("Building {:?} connection", self.transport_type());
        let connection: Box<dyn Connection> = match self {
            Self::Ssh(config) => Box::new(SshConnection::new(config.clone())?),
            Self::Local(config) => Box::new(LocalConnection::new(config.clone())?),
        };
        Ok(connection)
    }

    /// Build a connection and connect it
    pub fn open(&self, logfile: Transcript, logger: Option<&Dispatch>) -> Result<Box<dyn Connection>> {
        let mut connection = self.build()?;
        connection.connect(logfile, logger)?;
        Ok(connection)
    }
}
