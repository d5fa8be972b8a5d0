//! Byte streams backing a filesystem image.
//!
//! One [`SharedStream`] wraps the caller's image handle. Every read is an
//! explicit seek-then-read under a lock, so nodes and file cursors never rely
//! on an implicit shared position and can be used from several threads.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

/// A readable, seekable, sendable byte stream.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Shared handle to an image stream supporting positioned reads.
#[derive(Clone)]
pub struct SharedStream {
    inner: Arc<Mutex<Box<dyn ReadSeek>>>,
}

impl SharedStream {
    /// Take ownership of `stream`.
    pub fn new(stream: Box<dyn ReadSeek>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(stream)),
        }
    }

    /// Read up to `buf.len()` bytes at `offset`. Returns the number read,
    /// which is short only at end of stream.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("image stream lock poisoned"))?;
        stream.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match stream.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Read exactly `buf.len()` bytes at `offset`.
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let n = self.read_at(offset, buf)?;
        if n < buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short read at offset {offset}: wanted {}, got {n}", buf.len()),
            ));
        }
        Ok(())
    }

    /// Read exactly `len` bytes at `offset` into a new buffer.
    pub fn read_vec_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Total stream length.
    pub fn size(&self) -> io::Result<u64> {
        let mut stream = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("image stream lock poisoned"))?;
        stream.seek(SeekFrom::End(0))
    }
}

impl fmt::Debug for SharedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedStream").finish_non_exhaustive()
    }
}

/// One contiguous piece of a file's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// Byte offset in the image, or `None` for a sparse run that reads as zeros.
    pub offset: Option<u64>,
    /// Length in bytes.
    pub len: u64,
}

/// Independent `Read + Seek` cursor over a file made of [`Run`]s.
///
/// Reads stop at `size` even if the runs cover more bytes (the last block of
/// a file is usually only partly used).
#[derive(Debug)]
pub struct RunReader {
    stream: SharedStream,
    runs: Vec<Run>,
    size: u64,
    pos: u64,
}

impl RunReader {
    /// Create a cursor at offset 0.
    pub fn new(stream: SharedStream, runs: Vec<Run>, size: u64) -> Self {
        Self {
            stream,
            runs,
            size,
            pos: 0,
        }
    }

    /// Logical file size.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Read for RunReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.size {
            return Ok(0);
        }

        let mut run_start = 0u64;
        for run in &self.runs {
            let run_end = run_start + run.len;
            if self.pos < run_end {
                let within = self.pos - run_start;
                let want = (run_end - self.pos)
                    .min(self.size - self.pos)
                    .min(buf.len() as u64) as usize;
                let n = match run.offset {
                    Some(offset) => self.stream.read_at(offset + within, &mut buf[..want])?,
                    None => {
                        buf[..want].fill(0);
                        want
                    }
                };
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "file data runs past the end of the image",
                    ));
                }
                self.pos += n as u64;
                return Ok(n);
            }
            run_start = run_end;
        }

        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "file size exceeds its allocated blocks",
        ))
    }
}

impl Seek for RunReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(n) => self.size.checked_add_signed(n),
            SeekFrom::Current(n) => self.pos.checked_add_signed(n),
        };
        match target {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
