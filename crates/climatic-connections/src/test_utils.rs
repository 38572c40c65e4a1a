//! Test utilities for connection tests

use crate::{CommandLine, ConnectionError, PtySpawner, Terminal, TerminalSpawner, Transcript};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing::Dispatch;

/// Cloneable in-memory writer
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Messages of the DEBUG events captured by a fmt subscriber
    pub fn debug_lines(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter_map(|line| line.trim_start().strip_prefix("DEBUG"))
            .map(|message| message.trim().to_string())
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer whose every write fails
#[derive(Debug)]
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("transcript unavailable"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Logger that formats every event into a shared buffer
pub fn capture_logger() -> (Dispatch, SharedBuffer) {
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .with_writer(move || writer.clone())
        .finish();
    (Dispatch::new(subscriber), buffer)
}

/// Spawner that records requested command lines and runs a stand-in instead
#[derive(Debug)]
pub struct RecordingSpawner {
    stand_in: CommandLine,
    seen: Mutex<Vec<CommandLine>>,
}

impl RecordingSpawner {
    /// Run `cat` in place of every requested command
    pub fn new() -> Self {
        Self::with_stand_in(CommandLine::new("cat"))
    }

    /// Run `stand_in` in place of every requested command
    pub fn with_stand_in(stand_in: CommandLine) -> Self {
        Self {
            stand_in,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Commands requested so far
    pub fn seen(&self) -> Vec<CommandLine> {
        self.seen.lock().unwrap().clone()
    }
}

impl TerminalSpawner for RecordingSpawner {
    fn spawn(&self, command: &CommandLine, transcript: Transcript) -> Result<Terminal, ConnectionError> {
        self.seen.lock().unwrap().push(command.clone());
        PtySpawner::default().spawn(&self.stand_in, transcript)
    }
}
