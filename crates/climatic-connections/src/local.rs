//! Local process transport
//!
//! Runs a program on this machine behind a PTY, for devices reached through a
//! local helper (a serial console client, a vendor CLI) or for exercising
//! automation without a network.

use crate::connection::with_logger;
use crate::spawner::spawn_connection_terminal;
use crate::state::Lifecycle;
use crate::{
    CommandLine, Connection, ConnectionError, ConnectionInfo, ConnectionState, PtySpawner, Terminal,
    TerminalSpawner, Transcript, TransportType,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, Dispatch};

/// Default program for local connections
pub const DEFAULT_LOCAL_PROGRAM: &str = "/bin/sh";

fn default_program() -> String {
    DEFAULT_LOCAL_PROGRAM.to_string()
}

/// Local process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Program to run
    #[serde(default = "default_program")]
    pub program: String,
    /// Program arguments
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
        }
    }
}

impl LocalConfig {
    /// Run `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Check structural invariants
    pub fn validate(&self) -> Result<(), ConnectionError> {
        if self.program.trim().is_empty() {
            return Err(ConnectionError::Configuration("local program must not be empty".to_string()));
        }
        Ok(())
    }

    /// Build the process command line
    pub fn command_line(&self) -> CommandLine {
        CommandLine::new(&self.program).args(&self.args)
    }
}

/// Connection to a program running locally on a PTY
///
/// Like SSH, `disconnect` is passive; the process ends on its own or when the
/// terminal is dropped.
#[derive(Debug)]
pub struct LocalConnection {
    config: LocalConfig,
    spawner: Arc<dyn TerminalSpawner>,
    terminal: Option<Terminal>,
    lifecycle: Lifecycle,
}

impl LocalConnection {
    /// Create a connection using the native PTY system
    pub fn new(config: LocalConfig) -> Result<Self, ConnectionError> {
        Self::with_spawner(config, Arc::new(PtySpawner::default()))
    }

    /// Create a connection with a custom terminal spawner
    pub fn with_spawner(config: LocalConfig, spawner: Arc<dyn TerminalSpawner>) -> Result<Self, ConnectionError> {
        config.validate()?;
        Ok(Self {
            config,
            spawner,
            terminal: None,
            lifecycle: Lifecycle::default(),
        })
    }

    /// Local configuration
    pub fn config(&self) -> &LocalConfig {
        &self.config
    }
}

impl Connection for LocalConnection {
    fn connect(&mut self, logfile: Transcript, logger: Option<&Dispatch>) -> Result<(), ConnectionError> {
        self.lifecycle.begin_connect()?;

        let program = &self.config.program;
        with_logger(logger, || debug!("Starting local process ({}).", program));

        let command = self.config.command_line();
        let result = spawn_connection_terminal(self.spawner.as_ref(), &command, logfile);
        self.terminal = Some(self.lifecycle.finish_connect(result)?);
        Ok(())
    }

    fn disconnect(&mut self, logger: Option<&Dispatch>) -> Result<(), ConnectionError> {
        self.lifecycle.begin_disconnect();
        let program = &self.config.program;
        with_logger(logger, || debug!("Leaving local process ({}).", program));
        self.lifecycle.finish_disconnect();
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    fn terminal_mut(&mut self) -> Option<&mut Terminal> {
        self.terminal.as_mut()
    }

    fn take_terminal(&mut self) -> Option<Terminal> {
        self.terminal.take()
    }

    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            host: self.config.program.clone(),
            port: None,
            username: None,
            transport_type: TransportType::Local,
        }
    }
}
