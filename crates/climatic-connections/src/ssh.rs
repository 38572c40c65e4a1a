//! SSH transport
//!
//! Runs the system `ssh` client on a pseudo-terminal. The command line is
//!
//! ```text
//! ssh -p <port> <user>@<address> [-c <ciphers>] [-oKexAlgorithms=<algorithms>]
//! ```
//!
//! Authentication and the remote prompt are left to whoever drives the
//! terminal afterwards.

use crate::connection::with_logger;
use crate::spawner::spawn_connection_terminal;
use crate::state::Lifecycle;
use crate::{
    CommandLine, Connection, ConnectionError, ConnectionInfo, ConnectionState, PtySpawner, Terminal,
    TerminalSpawner, Transcript, TransportType,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, trace, Dispatch};

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default SSH client binary
pub const DEFAULT_SSH_BINARY: &str = "ssh";

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_binary() -> String {
    DEFAULT_SSH_BINARY.to_string()
}

/// SSH configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    /// Remote hostname or IP
    pub address: String,
    /// Login user
    pub user: String,
    /// Remote port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Cipher suites to offer, in preference order
    #[serde(
        default,
        deserialize_with = "deserialize_algorithms",
        skip_serializing_if = "Option::is_none"
    )]
    pub ciphers: Option<Vec<String>>,
    /// Key-exchange algorithms to offer, in preference order
    #[serde(
        default,
        alias = "keyex",
        deserialize_with = "deserialize_algorithms",
        skip_serializing_if = "Option::is_none"
    )]
    pub kex_algorithms: Option<Vec<String>>,
    /// SSH client executable
    #[serde(default = "default_binary")]
    pub binary: String,
}

impl SshConfig {
    /// Configuration for `user@address` on the default port
    pub fn new(address: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user: user.into(),
            port: DEFAULT_SSH_PORT,
            ciphers: None,
            kex_algorithms: None,
            binary: default_binary(),
        }
    }

    /// Parse a `user@host[:port]` target
    pub fn from_target(target: &str) -> Result<Self, ConnectionError> {
        let (user, rest) = target.split_once('@').ok_or_else(|| {
            ConnectionError::Configuration(format!("target `{}` has no user", target))
        })?;

        let mut host = rest;
        let mut port = DEFAULT_SSH_PORT;
        // A bare IPv6 address has several colons and no port
        if let Some((name, port_str)) = rest.rsplit_once(':').filter(|(name, _)| !name.contains(':')) {
            port = port_str.parse::<u16>().map_err(|_| {
                ConnectionError::Configuration(format!("invalid port `{}` in target", port_str))
            })?;
            host = name;
        }

        let config = Self::new(host, user).with_port(port);
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConnectionError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Restrict the offered cipher suites
    pub fn with_ciphers<I, S>(mut self, ciphers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ciphers = Some(ciphers.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict the offered key-exchange algorithms
    pub fn with_kex_algorithms<I, S>(mut self, algorithms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kex_algorithms = Some(algorithms.into_iter().map(Into::into).collect());
        self
    }

    /// Use a different SSH client executable
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Check structural invariants
    pub fn validate(&self) -> Result<(), ConnectionError> {
        validate_login_part("address", &self.address)?;
        validate_login_part("user", &self.user)?;
        if self.port == 0 {
            return Err(ConnectionError::Configuration("SSH port must be between 1 and 65535".to_string()));
        }
        if self.binary.trim().is_empty() {
            return Err(ConnectionError::Configuration("SSH binary must not be empty".to_string()));
        }
        if let Some(ciphers) = &self.ciphers {
            validate_algorithms("ciphers", ciphers)?;
        }
        if let Some(algorithms) = &self.kex_algorithms {
            validate_algorithms("key-exchange algorithms", algorithms)?;
        }
        Ok(())
    }

    /// `user@address` login target
    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.address)
    }

    /// Build the SSH client command line
    pub fn command_line(&self) -> CommandLine {
        let mut command = CommandLine::new(&self.binary)
            .arg("-p")
            .arg(self.port.to_string())
            .arg(self.target());

        if let Some(ciphers) = &self.ciphers {
            command = command.arg("-c").arg(ciphers.join(","));
        }

        if let Some(algorithms) = &self.kex_algorithms {
            command = command.arg(format!("-oKexAlgorithms={}", algorithms.join(",")));
        }

        command
    }
}

/// Split a comma-separated algorithm list such as `"blowfish-cbc,3des-cbc"`
pub fn parse_algorithm_list(list: &str) -> Vec<String> {
    list.split(',').map(|name| name.trim().to_string()).collect()
}

/// The `user@address` token must not be read by ssh as an option or split
fn validate_login_part(kind: &str, value: &str) -> Result<(), ConnectionError> {
    if value.is_empty() {
        return Err(ConnectionError::Configuration(format!("SSH {} must not be empty", kind)));
    }
    if value.starts_with('-') || value.contains('@') || value.chars().any(char::is_whitespace) {
        return Err(ConnectionError::Configuration(format!("invalid SSH {} `{}`", kind, value)));
    }
    Ok(())
}

fn validate_algorithms(kind: &str, names: &[String]) -> Result<(), ConnectionError> {
    if names.is_empty() {
        return Err(ConnectionError::Configuration(format!("{} list must not be empty", kind)));
    }
    for name in names {
        if name.is_empty() || name.contains(',') || name.chars().any(char::is_whitespace) {
            return Err(ConnectionError::Configuration(format!(
                "invalid entry `{}` in {} list",
                name, kind
            )));
        }
    }
    Ok(())
}

/// Accepts either `["a", "b"]` or `"a,b"`
fn deserialize_algorithms<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AlgorithmList {
        Csv(String),
        List(Vec<String>),
    }

    Ok(Option::<AlgorithmList>::deserialize(deserializer)?.map(|list| match list {
        AlgorithmList::Csv(csv) => parse_algorithm_list(&csv),
        AlgorithmList::List(names) => names,
    }))
}

/// Connection to a device CLI through the SSH client
///
/// `disconnect` does not close anything: the session ends when the remote
/// side logs out and the client exits on its own.
#[derive(Debug)]
pub struct SshConnection {
    config: SshConfig,
    spawner: Arc<dyn TerminalSpawner>,
    terminal: Option<Terminal>,
    lifecycle: Lifecycle,
}

impl SshConnection {
    /// Create a connection using the native PTY system
    pub fn new(config: SshConfig) -> Result<Self, ConnectionError> {
        Self::with_spawner(config, Arc::new(PtySpawner::default()))
    }

    /// Create a connection with a custom terminal spawner
    pub fn with_spawner(config: SshConfig, spawner: Arc<dyn TerminalSpawner>) -> Result<Self, ConnectionError> {
        config.validate()?;
        Ok(Self {
            config,
            spawner,
            terminal: None,
            lifecycle: Lifecycle::default(),
        })
    }

    /// SSH configuration
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Command line `connect` will spawn
    pub fn command_line(&self) -> CommandLine {
        self.config.command_line()
    }
}

impl Connection for SshConnection {
    fn connect(&mut self, logfile: Transcript, logger: Option<&Dispatch>) -> Result<(), ConnectionError> {
        self.lifecycle.begin_connect()?;

        let address = &self.config.address;
        with_logger(logger, || debug!("Connecting to SSH ({}).", address));

        let command = self.config.command_line();
        trace!("Spawning SSH client: {}", command);

        let result = spawn_connection_terminal(self.spawner.as_ref(), &command, logfile);
        let terminal = self.lifecycle.finish_connect(result)?;
        self.terminal = Some(terminal);
        Ok(())
    }

    fn disconnect(&mut self, logger: Option<&Dispatch>) -> Result<(), ConnectionError> {
        self.lifecycle.begin_disconnect();
        let address = &self.config.address;
        with_logger(logger, || debug!("Disconnecting from SSH ({}).", address));
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
            host: self.config.address.clone(),
            port: Some(self.config.port),
            username: Some(self.config.user.clone()),
            transport_type: TransportType::Ssh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{capture_logger, RecordingSpawner, SharedBuffer};
    use crate::WindowSize;
    use proptest::prelude::*;

    fn device() -> SshConfig {
        SshConfig::new("192.168.33.4", "admin")
    }

    #[test]
    fn test_ssh_config_defaults() {
        let config = device();
        assert_eq!(config.port, 22);
        assert_eq!(config.binary, "ssh");
        assert!(config.ciphers.is_none());
        assert!(config.kex_algorithms.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_plain_command_line() {
        assert_eq!(device().command_line().to_string(), "ssh -p 22 admin@192.168.33.4");
    }

    #[test]
    fn test_cipher_flag() {
        let config = device().with_ciphers(parse_algorithm_list("blowfish-cbc,3des-cbc"));
        let command = config.command_line();
        assert_eq!(command.to_string(), "ssh -p 22 admin@192.168.33.4 -c blowfish-cbc,3des-cbc");
        assert!(!command.to_string().contains("KexAlgorithms"));
    }

    #[test]
    fn test_kex_flag() {
        let config = device().with_kex_algorithms(["diffie-hellman-group14-sha1"]);
        assert_eq!(
            config.command_line().to_string(),
            "ssh -p 22 admin@192.168.33.4 -oKexAlgorithms=diffie-hellman-group14-sha1"
        );
    }

    #[test]
    fn test_both_flags_in_order() {
        let config = device()
            .with_port(2222)
            .with_ciphers(["aes128-ctr"])
            .with_kex_algorithms(["diffie-hellman-group-exchange-sha1", "diffie-hellman-group14-sha1"]);
        let command = config.command_line();
        assert_eq!(
            command.arguments(),
            &[
                "-p",
                "2222",
                "admin@192.168.33.4",
                "-c",
                "aes128-ctr",
                "-oKexAlgorithms=diffie-hellman-group-exchange-sha1,diffie-hellman-group14-sha1",
            ]
        );
    }

    #[test]
    fn test_custom_binary() {
        let config = device().with_binary("/usr/local/bin/ssh");
        assert_eq!(config.command_line().program(), "/usr/local/bin/ssh");
    }

    #[test]
    fn test_validation_errors() {
        let cases = vec![
            SshConfig::new("", "admin"),
            SshConfig::new("host", " "),
            device().with_port(0),
            device().with_binary(""),
            device().with_ciphers(Vec::<String>::new()),
            device().with_ciphers(["aes128-ctr", ""]),
            device().with_kex_algorithms(["bad name"]),
            device().with_kex_algorithms(["a,b"]),
            SshConfig::new("switch", "-oProxyCommand=touch /tmp/x"),
            SshConfig::new("-oProxyCommand=x", "admin"),
            SshConfig::new("switch", "ad min"),
            SshConfig::new("switch", "admin@jump"),
            SshConfig::new("switch\t", "admin"),
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(ConnectionError::Configuration(_))),
                "expected configuration error for {:?}",
                config
            );
            assert!(SshConnection::new(config).is_err());
        }
    }

    #[test]
    fn test_from_target() {
        let config = SshConfig::from_target("admin@192.168.33.4").unwrap();
        assert_eq!(config, device());

        let config = SshConfig::from_target("ops@switch.lab:2222").unwrap();
        assert_eq!(config.user, "ops");
        assert_eq!(config.address, "switch.lab");
        assert_eq!(config.port, 2222);

        let config = SshConfig::from_target("ops@fe80::1").unwrap();
        assert_eq!(config.address, "fe80::1");
        assert_eq!(config.port, 22);

        assert!(SshConfig::from_target("switch.lab").is_err());
        assert!(SshConfig::from_target("ops@switch.lab:ssh").is_err());
        assert!(SshConfig::from_target("ops@switch.lab:0").is_err());
        assert!(SshConfig::from_target("@switch.lab").is_err());
    }

    #[test]
    fn test_from_json() {
        let config = SshConfig::from_json(
            r#"{"address": "192.168.33.4", "user": "admin", "ciphers": "blowfish-cbc,3des-cbc",
                "keyex": ["diffie-hellman-group14-sha1"]}"#,
        )
        .unwrap();
        assert_eq!(config.port, 22);
        assert_eq!(config.ciphers, Some(vec!["blowfish-cbc".to_string(), "3des-cbc".to_string()]));
        assert_eq!(config.kex_algorithms, Some(vec!["diffie-hellman-group14-sha1".to_string()]));

        let config = SshConfig::from_json(r#"{"address": "h", "user": "u", "ciphers": null}"#).unwrap();
        assert!(config.ciphers.is_none());

        assert!(matches!(
            SshConfig::from_json(r#"{"address": "h", "user": "u", "port": 0}"#),
            Err(ConnectionError::Configuration(_))
        ));
        assert!(matches!(
            SshConfig::from_json(r#"{"address": "h"}"#),
            Err(ConnectionError::Configuration(_))
        ));
    }

    #[test]
    fn test_connection_info() {
        let connection = SshConnection::new(device().with_port(2222)).unwrap();
        let info = connection.connection_info();
        assert_eq!(info.host, "192.168.33.4");
        assert_eq!(info.port, Some(2222));
        assert_eq!(info.username.as_deref(), Some("admin"));
        assert_eq!(info.transport_type, TransportType::Ssh);
        assert_eq!(connection.state(), ConnectionState::Uninitialized);
        assert!(connection.terminal().is_none());
    }

    #[test]
    fn test_disconnect_without_logger() {
        let mut connection = SshConnection::new(device()).unwrap();
        assert!(connection.disconnect(None).is_ok());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_disconnect_logs_one_debug_line() {
        let (logger, captured) = capture_logger();
        let mut connection = SshConnection::new(device()).unwrap();
        connection.disconnect(Some(&logger)).unwrap();
        assert_eq!(
            captured.debug_lines(),
            vec!["Disconnecting from SSH (192.168.33.4).".to_string()]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_connect_spawns_and_resizes() {
        let spawner = Arc::new(RecordingSpawner::new());
        let (logger, captured) = capture_logger();
        let mut connection = SshConnection::with_spawner(device(), spawner.clone()).unwrap();

        connection.connect(Transcript::sink(), Some(&logger)).unwrap();

        assert_eq!(connection.state(), ConnectionState::Connected);
        assert!(connection.is_connected());
        let seen: Vec<String> = spawner.seen().iter().map(ToString::to_string).collect();
        assert_eq!(seen, vec!["ssh -p 22 admin@192.168.33.4".to_string()]);
        assert_eq!(connection.terminal().unwrap().size().unwrap(), WindowSize::new(24, 500));
        assert_eq!(captured.debug_lines(), vec!["Connecting to SSH (192.168.33.4).".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_second_connect_is_rejected() {
        let spawner = Arc::new(RecordingSpawner::new());
        let mut connection = SshConnection::with_spawner(device(), spawner.clone()).unwrap();
        connection.connect(Transcript::sink(), None).unwrap();

        let err = connection.connect(Transcript::sink(), None).unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::InvalidState {
                operation: "connect",
                state: ConnectionState::Connected
            }
        ));
        assert_eq!(spawner.seen().len(), 1);
        assert_eq!(connection.state(), ConnectionState::Connected);
    }

    #[cfg(unix)]
    #[test]
    fn test_disconnect_keeps_terminal() {
        let spawner = Arc::new(RecordingSpawner::new());
        let mut connection = SshConnection::with_spawner(device(), spawner).unwrap();
        connection.connect(Transcript::sink(), None).unwrap();
        connection.disconnect(None).unwrap();

        assert_eq!(connection.state(), ConnectionState::Disconnected);
        let terminal = connection.terminal_mut().unwrap();
        assert!(terminal.is_alive());

        // Reconnect replaces the handle
        connection.connect(Transcript::sink(), None).unwrap();
        assert!(connection.take_terminal().is_some());
        assert!(connection.terminal().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_connect_mirrors_to_logfile() {
        let spawner = Arc::new(RecordingSpawner::new());
        let buffer = SharedBuffer::default();
        let mut connection = SshConnection::with_spawner(device(), spawner).unwrap();
        connection.connect(Transcript::new(buffer.clone()), None).unwrap();

        connection.terminal_mut().unwrap().send_line("show version").unwrap();
        assert!(buffer.contents().contains("show version"));
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_failure_marks_failed() {
        let config = device().with_binary("/nonexistent/climatic-ssh");
        let mut connection = SshConnection::new(config).unwrap();

        let err = connection.connect(Transcript::sink(), None).unwrap_err();
        assert!(matches!(err, ConnectionError::Spawn { .. }));
        assert_eq!(connection.state(), ConnectionState::Failed);
        assert!(connection.terminal().is_none());

        // Retrying is allowed and fails the same way
        let err = connection.connect(Transcript::sink(), None).unwrap_err();
        assert!(matches!(err, ConnectionError::Spawn { .. }));
    }

    fn algorithm() -> impl Strategy<Value = String> {
        "[a-z0-9][a-z0-9@.-]{0,24}"
    }

    fn algorithms() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(algorithm(), 1..5)
    }

    proptest! {
        #[test]
        fn test_mandatory_tokens_single_spaced(
            address in "[a-z0-9][a-z0-9.-]{0,30}",
            user in "[a-z][a-z0-9_]{0,15}",
            port in 1u16..=65535,
        ) {
            let config = SshConfig::new(address.clone(), user.clone()).with_port(port);
            let rendered = config.command_line().to_string();
            prop_assert_eq!(&rendered, &format!("ssh -p {} {}@{}", port, user, address));
            prop_assert!(!rendered.contains("  "));
            prop_assert!(!rendered.ends_with(' '));
        }

        #[test]
        fn test_cipher_flag_joins_in_order(ciphers in algorithms()) {
            let config = device().with_ciphers(ciphers.clone());
            let args = config.command_line().arguments().to_vec();
            let flag = args.iter().position(|arg| arg == "-c");
            prop_assert_eq!(flag, Some(3));
            prop_assert_eq!(&args[4], &ciphers.join(","));
            prop_assert!(!args.iter().any(|arg| arg.starts_with("-oKexAlgorithms=")));
        }

        #[test]
        fn test_kex_flag_joins_in_order(algorithms in algorithms(), with_ciphers in any::<bool>()) {
            let mut config = device().with_kex_algorithms(algorithms.clone());
            if with_ciphers {
                config = config.with_ciphers(["aes256-ctr"]);
            }
            let args = config.command_line().arguments().to_vec();
            let expected = format!("-oKexAlgorithms={}", algorithms.join(","));
            prop_assert_eq!(args.last(), Some(&expected));
            prop_assert_eq!(args.iter().any(|arg| arg == "-c"), with_ciphers);
        }

        #[test]
        fn test_parse_algorithm_list_preserves_order(names in algorithms()) {
            prop_assert_eq!(parse_algorithm_list(&names.join(",")), names);
        }
    }
}
