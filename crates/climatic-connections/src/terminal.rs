//! Pseudo-terminal handles and transcripts
//!
//! A [`Terminal`] is the live end of a connection: a child process attached
//! to a PTY. It implements [`Read`] and [`Write`] so an expect engine can
//! drive it directly, and mirrors every byte in either direction to the
//! caller's [`Transcript`].

use crate::{CommandLine, ConnectionError};
use portable_pty::{native_pty_system, Child, ChildKiller, ExitStatus, MasterPty, PtyPair, PtySize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace, warn};

/// Rows of the connection window
pub const WINDOW_ROWS: u16 = 24;

/// Columns of the connection window; wide so device output does not wrap
pub const WINDOW_COLS: u16 = 500;

const READ_CHUNK: usize = 4096;

/// PTY geometry in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    /// Number of rows
    pub rows: u16,
    /// Number of columns
    pub cols: u16,
}

impl WindowSize {
    /// Geometry applied to every connection right after spawn
    pub const CONNECTION: WindowSize = WindowSize {
        rows: WINDOW_ROWS,
        cols: WINDOW_COLS,
    };

    /// Create a window size
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

impl Default for WindowSize {
    /// Classic 24x80 console, the size a PTY starts with
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl From<WindowSize> for PtySize {
    fn from(size: WindowSize) -> Self {
        PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

impl From<PtySize> for WindowSize {
    fn from(size: PtySize) -> Self {
        Self {
            rows: size.rows,
            cols: size.cols,
        }
    }
}

/// Caller-owned sink receiving a verbatim copy of terminal traffic
///
/// Cloning shares the underlying writer.
#[derive(Clone)]
pub struct Transcript {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Transcript {
    /// Wrap any writer
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Transcript that discards everything
    pub fn sink() -> Self {
        Self::new(io::sink())
    }

    /// Create (or truncate) a transcript file
    pub fn file(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(File::create(path)?))
    }

    /// Append bytes and flush
    pub fn record(&self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut writer = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("transcript lock poisoned"))?;
        writer.write_all(bytes)?;
        writer.flush()
    }
}

impl fmt::Debug for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transcript").finish_non_exhaustive()
    }
}

/// Incremental UTF-8 decoder that holds back split multi-byte sequences
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8], eof: bool) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        let mut start = 0;
        while start < self.pending.len() {
            let err = match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(err) => err,
            };
            let valid_end = start + err.valid_up_to();
            text.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
            match err.error_len() {
                Some(len) => {
                    text.push(char::REPLACEMENT_CHARACTER);
                    start = valid_end + len;
                }
                // Incomplete trailing sequence; wait for the rest unless at EOF
                None if !eof => {
                    start = valid_end;
                    break;
                }
                None => {
                    text.push(char::REPLACEMENT_CHARACTER);
                    start = self.pending.len();
                }
            }
        }
        self.pending.drain(..start);
        text
    }
}

/// Live process attached to a pseudo-terminal
pub struct Terminal {
    command: CommandLine,
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    transcript: Transcript,
    transcript_error: Option<io::Error>,
    decoder: Utf8Decoder,
}

impl Terminal {
    /// Spawn `command` on a fresh PTY of the given size
    pub fn open(
        command: &CommandLine,
        transcript: Transcript,
        size: WindowSize,
    ) -> Result<Self, ConnectionError> {
        let pty_system = native_pty_system();

        let PtyPair { master, slave } = pty_system
            .openpty(size.into())
            .map_err(|e| ConnectionError::Pty(format!("Failed to open PTY: {}", e)))?;

        let child = slave
            .spawn_command(command.to_builder())
            .map_err(|e| ConnectionError::Spawn {
                command: command.to_string(),
                message: e.to_string(),
            })?;
        // The child holds its own copy; keeping ours would hide EOF.
        drop(slave);

        let reader = master
            .try_clone_reader()
            .map_err(|e| ConnectionError::Pty(format!("Failed to get PTY reader: {}", e)))?;
        let writer = master
            .take_writer()
            .map_err(|e| ConnectionError::Pty(format!("Failed to get PTY writer: {}", e)))?;

        debug!(command = %command, pid = ?child.process_id(), "Spawned terminal process");

        Ok(Self {
            command: command.clone(),
            master,
            child,
            reader,
            writer,
            transcript,
            transcript_error: None,
            decoder: Utf8Decoder::default(),
        })
    }

    /// Command line the process was started with
    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    /// OS process id, if still known
    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Current PTY geometry
    pub fn size(&self) -> Result<WindowSize, ConnectionError> {
        self.master
            .get_size()
            .map(WindowSize::from)
            .map_err(|e| ConnectionError::Pty(format!("Failed to query PTY size: {}", e)))
    }

    /// Change the PTY geometry
    pub fn resize(&self, size: WindowSize) -> Result<(), ConnectionError> {
        trace!(rows = size.rows, cols = size.cols, "Resizing PTY");
        self.master
            .resize(size.into())
            .map_err(|e| ConnectionError::Pty(format!("Failed to resize PTY: {}", e)))
    }

    /// Whether the process is still running
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Block until the process exits
    pub fn wait(&mut self) -> Result<ExitStatus, ConnectionError> {
        Ok(self.child.wait()?)
    }

    /// Terminate the process
    pub fn kill(&mut self) -> Result<(), ConnectionError> {
        Ok(self.child.kill()?)
    }

    /// Write bytes to the terminal and flush
    pub fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data)?;
        self.flush()
    }

    /// Write a line followed by a newline
    pub fn send_line(&mut self, line: &str) -> io::Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.send(&data)
    }

    /// Block for the next chunk of output and decode it as UTF-8
    ///
    /// Returns an empty string once the process has closed the terminal.
    /// Multi-byte characters split across reads are held until complete.
    pub fn read_text(&mut self) -> io::Result<String> {
        let mut buf = [0u8; READ_CHUNK];
        let n = self.read(&mut buf)?;
        Ok(self.decoder.decode(&buf[..n], n == 0))
    }
}

const EIO: i32 = 5;

/// Linux and macOS report a hung-up PTY master as EIO rather than EOF
fn is_hangup(err: &io::Error) -> bool {
    cfg!(unix) && err.raw_os_error() == Some(EIO)
}

impl Terminal {
    /// Mirror bytes that already crossed the PTY
    ///
    /// A transcript failure is held and returned by the next read or write,
    /// so the bytes of the current call still reach the caller.
    fn mirror(&mut self, bytes: &[u8]) {
        if let Err(e) = self.transcript.record(bytes) {
            warn!("Failed to write transcript: {}", e);
            self.transcript_error.get_or_insert(e);
        }
    }

    fn take_transcript_error(&mut self) -> io::Result<()> {
        match self.transcript_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Read for Terminal {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.take_transcript_error()?;
        let n = match self.reader.read(buf) {
            Ok(n) => n,
            Err(e) if is_hangup(&e) => 0,
            Err(e) => return Err(e),
        };
        self.mirror(&buf[..n]);
        Ok(n)
    }
}

impl Write for Terminal {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.take_transcript_error()?;
        let n = self.writer.write(buf)?;
        self.mirror(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl fmt::Debug for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Terminal")
            .field("command", &self.command)
            .field("pid", &self.child.process_id())
            .finish_non_exhaustive()
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if !self.is_alive() {
            return;
        }
        if let Err(e) = self.child.kill() {
            warn!("Failed to kill terminal process: {}", e);
        }
        // Reap to avoid a zombie
        match self.child.wait() {
            Ok(status) => trace!("Terminal process exited: {:?}", status),
            Err(e) => debug!("Error waiting for terminal process: {}", e),
        }
    }
}
