use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{trace, warn};

use crate::errors::{ScanError, ScanResult};

const BUFFER_CAPACITY: usize = 65536;

/// How to handle bytes that are not valid UTF-8
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Fail the read with an `InvalidData` error
    #[default]
    FailFast,
    /// Replace invalid sequences with U+FFFD and keep going
    Lossy,
}

/// Sequential supplier of lines.
///
/// Not thread-safe on its own; wrap it in [`SynchronizedLineSource`] to share
/// it between workers. `Ok(None)` means the source is exhausted.
pub trait LineSource {
    fn next_line(&mut self) -> io::Result<Option<String>>;
}

impl<S: LineSource + ?Sized> LineSource for &mut S {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        (**self).next_line()
    }
}

impl<S: LineSource + ?Sized> LineSource for Box<S> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        (**self).next_line()
    }
}

/// Reads `\n`-terminated lines from any buffered reader.
///
/// The terminator (and a preceding `\r`) is stripped. A final line without a
/// terminator is still returned.
#[derive(Debug)]
pub struct ReaderLineSource<R> {
    reader: R,
    buffer: Vec<u8>,
    encoding_mode: EncodingMode,
    line_number: u64,
}

impl<R: BufRead> ReaderLineSource<R> {
    pub fn new(reader: R, encoding_mode: EncodingMode) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(256),
            encoding_mode,
            line_number: 0,
        }
    }

    fn decode(&self, bytes: Vec<u8>) -> io::Result<String> {
        match self.encoding_mode {
            EncodingMode::FailFast => String::from_utf8(bytes).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid UTF-8 on line {}: {}", self.line_number, e),
                )
            }),
            EncodingMode::Lossy => match String::from_utf8(bytes) {
                Ok(line) => Ok(line),
                Err(e) => {
                    warn!("Invalid UTF-8 replaced on line {}", self.line_number);
                    Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
                }
            },
        }
    }
}

impl ReaderLineSource<BufReader<File>> {
    /// Opens `path` for line reading
    pub fn open(path: &Path, encoding_mode: EncodingMode) -> ScanResult<Self> {
        let file = File::open(path).map_err(|e| ScanError::from_open_error(e, path))?;
        trace!("Opened {} for scanning", path.display());
        Ok(Self::new(
            BufReader::with_capacity(BUFFER_CAPACITY, file),
            encoding_mode,
        ))
    }
}

impl ReaderLineSource<BufReader<io::Stdin>> {
    /// Reads standard input. Unlike a `StdinLock`, the handle can move to a
    /// reader thread.
    pub fn stdin(encoding_mode: EncodingMode) -> Self {
        Self::new(
            BufReader::with_capacity(BUFFER_CAPACITY, io::stdin()),
            encoding_mode,
        )
    }
}

impl<R: BufRead> LineSource for ReaderLineSource<R> {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buffer.clear();
        if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        if self.buffer.last() == Some(&b'\n') {
            self.buffer.pop();
            if self.buffer.last() == Some(&b'\r') {
                self.buffer.pop();
            }
        }

        let bytes = std::mem::replace(&mut self.buffer, Vec::with_capacity(256));
        self.decode(bytes).map(Some)
    }
}

/// Lines held in memory, handed out front to back
#[derive(Debug, Clone, Default)]
pub struct MemoryLineSource {
    lines: VecDeque<String>,
}

impl MemoryLineSource {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Splits `text` the way [`ReaderLineSource`] would
    pub fn from_text(text: &str) -> Self {
        Self::from_lines(text.lines())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl LineSource for MemoryLineSource {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

#[derive(Debug)]
struct ReadState<S> {
    source: S,
    exhausted: bool,
    error: Option<io::Error>,
}

/// A [`LineSource`] that several workers can read from at once.
///
/// Every call to [`try_read_line`](Self::try_read_line) holds the read lock
/// for exactly one underlying read, so each line goes to exactly one caller.
/// The first I/O error is kept and the source then reports exhaustion to
/// everyone, which stops all workers; the error comes back from
/// [`finish`](Self::finish).
#[derive(Debug)]
pub struct SynchronizedLineSource<S> {
    state: Mutex<ReadState<S>>,
    lines_read: AtomicU64,
}

impl<S: LineSource> SynchronizedLineSource<S> {
    pub fn new(source: S) -> Self {
        Self {
            state: Mutex::new(ReadState {
                source,
                exhausted: false,
                error: None,
            }),
            lines_read: AtomicU64::new(0),
        }
    }

    /// Reads the next line, or `None` once the source is exhausted or failed.
    pub fn try_read_line(&self) -> Option<String> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.exhausted {
            return None;
        }
        match state.source.next_line() {
            Ok(Some(line)) => {
                self.lines_read.fetch_add(1, Ordering::Relaxed);
                Some(line)
            }
            Ok(None) => {
                state.exhausted = true;
                None
            }
            Err(e) => {
                warn!("Source read failed, stopping all readers: {}", e);
                state.exhausted = true;
                state.error = Some(e);
                None
            }
        }
    }

    /// Number of lines handed out so far
    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::Relaxed)
    }

    /// Returns the first read error, if any, once all readers are done
    pub fn finish(self) -> io::Result<()> {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        match state.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
