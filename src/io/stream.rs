//! Seekable, buffered cursor over a [`ReadAt`] source.
//!
//! Parsing code thinks in terms of "seek here, read n bytes", while the
//! sources only offer positional reads. [`ArchiveStream`] bridges the two
//! and keeps a read-ahead buffer so that the many small reads of a
//! directory walk collapse into a few range requests.

use std::io::SeekFrom;
use std::sync::Arc;

use super::ReadAt;
use crate::error::{Error, Result, TransportError};

/// Default read-ahead size for [`ArchiveStream`].
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

pub struct ArchiveStream<R: ReadAt> {
    reader: Arc<R>,
    size: u64,
    pos: u64,
    buf: Vec<u8>,
    buf_start: u64,
    buffer_size: usize,
}

impl<R: ReadAt> ArchiveStream<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self::with_buffer_size(reader, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(reader: Arc<R>, buffer_size: usize) -> Self {
        let size = reader.size();
        Self {
            reader,
            size,
            pos: 0,
            buf: Vec::new(),
            buf_start: 0,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Total length of the underlying source.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    /// Move the cursor. Positions past the end are allowed (reads then
    /// return nothing); positions before byte 0 are rejected.
    pub fn seek(&mut self, target: SeekFrom) -> std::result::Result<u64, TransportError> {
        let (base, delta) = match target {
            SeekFrom::Start(n) => {
                self.pos = n;
                return Ok(n);
            }
            SeekFrom::Current(d) => (self.pos, d),
            SeekFrom::End(d) => (self.size, d),
        };
        let new_pos = base as i128 + delta as i128;
        if new_pos < 0 {
            return Err(TransportError::InvalidSeek(new_pos));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }

    /// Read up to `n` bytes from the current position.
    ///
    /// Fewer bytes are returned only at the end of the source.
    pub async fn read(&mut self, n: usize) -> std::result::Result<Vec<u8>, TransportError> {
        let available = self.size.saturating_sub(self.pos);
        let want = (n as u64).min(available) as usize;
        let mut out = Vec::with_capacity(want);

        while out.len() < want {
            let buf_end = self.buf_start + self.buf.len() as u64;
            if self.pos >= self.buf_start && self.pos < buf_end {
                let from = (self.pos - self.buf_start) as usize;
                let take = (want - out.len()).min(self.buf.len() - from);
                out.extend_from_slice(&self.buf[from..from + take]);
                self.pos += take as u64;
                continue;
            }

            let remaining = want - out.len();
            if remaining >= self.buffer_size {
                // Large payload reads bypass the buffer.
                let start = out.len();
                out.resize(want, 0);
                let got = self.reader.read_at(self.pos, &mut out[start..]).await?;
                out.truncate(start + got);
                self.pos += got as u64;
                break;
            }

            self.fill().await?;
            if self.buf.is_empty() {
                break;
            }
        }

        Ok(out)
    }

    /// Read exactly `n` bytes; a short read means the record is truncated.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let at = self.pos;
        let bytes = self.read(n).await?;
        if bytes.len() < n {
            return Err(Error::malformed(format!(
                "expected {n} bytes at offset {at}, only {} available",
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    async fn fill(&mut self) -> std::result::Result<(), TransportError> {
        let len = (self.size.saturating_sub(self.pos)).min(self.buffer_size as u64) as usize;
        self.buf.resize(len, 0);
        let got = self.reader.read_at(self.pos, &mut self.buf).await?;
        self.buf.truncate(got);
        self.buf_start = self.pos;
        Ok(())
    }
}
