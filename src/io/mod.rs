mod http;
mod local;
mod stream;

pub use http::{HttpRangeReader, RetryPolicy};
pub use local::LocalFileReader;
pub use stream::{ArchiveStream, DEFAULT_BUFFER_SIZE};

use async_trait::async_trait;

use crate::error::TransportError;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer.
    ///
    /// Returns the number of bytes read, which is less than `buf.len()`
    /// only when the end of the source is reached.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}

/// In-memory archives, mostly useful for tests and already-fetched data.
#[async_trait]
impl ReadAt for Vec<u8> {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, TransportError> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.len());
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}
