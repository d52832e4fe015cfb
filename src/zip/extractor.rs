use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::io::{ArchiveStream, DEFAULT_BUFFER_SIZE, ReadAt};

use super::catalog::{self, Catalog, CatalogEntry};
use super::inflate;
use super::locator::{self, DirectoryLocation};

/// Hands out the seek target for an entry's data.
///
/// This is the seam between catalog resolution and decompression: the
/// offset returned here is the Local File Header position with any zip64
/// override already applied by the catalog walk.
pub struct Positioner<'a> {
    catalog: &'a Catalog,
}

impl<'a> Positioner<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn seek_target(entry: &CatalogEntry) -> u64 {
        entry.local_header_offset
    }

    pub fn offset_of(&self, name: &str) -> Result<u64> {
        self.catalog
            .get(name)
            .map(Self::seek_target)
            .ok_or_else(|| Error::NameNotFound(name.to_string()))
    }
}

/// ZIP file extractor
///
/// Every call opens its own [`ArchiveStream`], so nothing read for one
/// operation is shared with another.
pub struct ZipExtractor<R: ReadAt> {
    reader: Arc<R>,
    buffer_size: usize,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            reader,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Read-ahead size of the streams this extractor opens.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    fn open_stream(&self) -> ArchiveStream<R> {
        ArchiveStream::with_buffer_size(self.reader.clone(), self.buffer_size)
    }

    /// Find the Central Directory.
    pub async fn locate(&self) -> Result<DirectoryLocation> {
        locator::locate(&mut self.open_stream()).await
    }

    /// Locate and walk the Central Directory.
    pub async fn catalog(&self) -> Result<Catalog> {
        let mut stream = self.open_stream();
        let location = locator::locate(&mut stream).await?;
        catalog::build(&mut stream, &location).await
    }

    /// Decompress `entry` into `writer`, returning the bytes written.
    pub async fn extract_to_writer<W>(&self, entry: &CatalogEntry, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut stream = self.open_stream();
        stream.seek(SeekFrom::Start(Positioner::seek_target(entry)))?;
        inflate::decompress_entry(&mut stream, entry, writer).await
    }

    /// Extract file data to memory
    pub async fn extract_to_memory(&self, entry: &CatalogEntry) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(entry.uncompressed_size.min(1 << 24) as usize);
        self.extract_to_writer(entry, &mut buf).await?;
        Ok(buf)
    }

    /// Extract file to disk, creating parent directories as needed.
    pub async fn extract_to_file(&self, entry: &CatalogEntry, output_path: &Path) -> Result<u64> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(Error::Output)?;
            }
        }

        let mut file = fs::File::create(output_path).await.map_err(Error::Output)?;
        let written = self.extract_to_writer(entry, &mut file).await?;
        file.sync_all().await.map_err(Error::Output)?;

        Ok(written)
    }

    /// Extract file to stdout
    pub async fn extract_to_stdout(&self, entry: &CatalogEntry) -> Result<u64> {
        let mut stdout = tokio::io::stdout();
        let written = self.extract_to_writer(entry, &mut stdout).await?;
        stdout.flush().await.map_err(Error::Output)?;
        Ok(written)
    }
}
