//! Terminal spawning seam

use crate::{CommandLine, ConnectionError, Terminal, Transcript, WindowSize};
use std::fmt;

/// Produces a live [`Terminal`] for a command line
///
/// Transports depend on this trait rather than on the PTY system directly so
/// the process layer can be swapped out.
pub trait TerminalSpawner: fmt::Debug + Send + Sync {
    /// Start `command` attached to a pseudo-terminal, mirroring I/O to `transcript`
    fn spawn(&self, command: &CommandLine, transcript: Transcript) -> Result<Terminal, ConnectionError>;
}

/// Spawner backed by the platform's native PTY system
#[derive(Debug, Clone, Default)]
pub struct PtySpawner {
    initial_size: WindowSize,
}

impl PtySpawner {
    /// Spawner whose PTYs open at `initial_size` before any resize
    pub fn with_initial_size(initial_size: WindowSize) -> Self {
        Self { initial_size }
    }
}

impl TerminalSpawner for PtySpawner {
    fn spawn(&self, command: &CommandLine, transcript: Transcript) -> Result<Terminal, ConnectionError> {
        Terminal::open(command, transcript, self.initial_size)
    }
}

/// Spawn through `spawner` and apply the connection window size
pub(crate) fn spawn_connection_terminal(
    spawner: &dyn TerminalSpawner,
    command: &CommandLine,
    transcript: Transcript,
) -> Result<Terminal, ConnectionError> {
    let terminal = spawner.spawn(command, transcript)?;
    terminal.resize(WindowSize::CONNECTION)?;
    Ok(terminal)
}
