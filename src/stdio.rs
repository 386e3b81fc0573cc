//! The stdio capability handed to a module instance.

use std::{
    io::{self, ErrorKind, Read, Write},
    ops::Range,
    sync::{Arc, Mutex, PoisonError},
};

pub const STDIN: i32 = 0;
pub const STDOUT: i32 = 1;
pub const STDERR: i32 = 2;

/// Errors raised by a host call. Any of these traps the calling module.
#[derive(Debug, thiserror::Error)]
pub enum StdioError {
    #[error("bad file descriptor {fd}")]
    BadDescriptor { fd: i32 },
    #[error("buffer of {count} bytes at {offset} is outside linear memory of {memory_len} bytes")]
    OutOfBounds {
        offset: u32,
        count: u32,
        memory_len: usize,
    },
    #[error("module has no memory export named '{name}'")]
    MissingMemory { name: String },
    #[error("i/o on descriptor {fd} failed: {error}")]
    Io { fd: i32, error: io::Error },
}

/// Blocking streams behind descriptors 0, 1 and 2.
///
/// Only those three are mapped: reads accept 0, writes accept 1 and 2, and
/// any other descriptor fails with [`StdioError::BadDescriptor`].
pub struct Stdio {
    input: Box<dyn Read + Send>,
    output: Box<dyn Write + Send>,
    error: Box<dyn Write + Send>,
}

impl Stdio {
    pub fn new(
        input: impl Read + Send + 'static,
        output: impl Write + Send + 'static,
        error: impl Write + Send + 'static,
    ) -> Self {
        Self {
            input: Box::new(input),
            output: Box::new(output),
            error: Box::new(error),
        }
    }

    /// Bind the descriptors to the process's own stdin, stdout and stderr.
    pub fn inherit() -> Self {
        Self::new(io::stdin(), io::stdout(), io::stderr())
    }

    /// Read up to `buf.len()` bytes from `fd` with a single blocking read.
    ///
    /// The count may be short; `0` means end of stream.
    pub fn read(&mut self, fd: i32, buf: &mut [u8]) -> Result<usize, StdioError> {
        let input = match fd {
            STDIN => &mut self.input,
            _ => return Err(StdioError::BadDescriptor { fd }),
        };

        retry(|| input.read(buf)).map_err(|error| StdioError::Io { fd, error })
    }

    /// Write `buf` to `fd` with a single blocking write and flush it.
    ///
    /// Returns how many bytes were accepted, which may be fewer than `buf.len()`.
    pub fn write(&mut self, fd: i32, buf: &[u8]) -> Result<usize, StdioError> {
        let output = match fd {
            STDOUT => &mut self.output,
            STDERR => &mut self.error,
            _ => return Err(StdioError::BadDescriptor { fd }),
        };

        let written = retry(|| output.write(buf)).map_err(|error| StdioError::Io { fd, error })?;
        output
            .flush()
            .map_err(|error| StdioError::Io { fd, error })?;

        Ok(written)
    }
}

impl Default for Stdio {
    fn default() -> Self {
        Self::inherit()
    }
}

fn retry<T>(mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match op() {
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

/// Check that `count` bytes at `offset` lie inside a memory of `memory_len`
/// bytes and return them as a byte range.
pub fn guest_range(memory_len: usize, offset: u32, count: u32) -> Result<Range<usize>, StdioError> {
    let start = offset as usize;
    match start.checked_add(count as usize) {
        Some(end) if end <= memory_len => Ok(start..end),
        _ => Err(StdioError::OutOfBounds {
            offset,
            count,
            memory_len,
        }),
    }
}

/// An in-memory output stream that can be inspected after the module ran.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self
            .0
            .lock()
            .map_err(|_| io::Error::new(ErrorKind::Other, "captured stream poisoned"))?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
