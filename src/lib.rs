//! # s3unzip
//!
//! List and extract ZIP archives held in object storage without
//! downloading them whole.
//!
//! Only the tail of the archive (End of Central Directory and, for zip64
//! archives, its locator) and the Central Directory itself are read to
//! build the catalog. Extraction then seeks straight to each selected
//! entry's Local File Header, so a remote archive costs a handful of
//! range requests per entry.
//!
//! ## Features
//!
//! - Local files, HTTP/HTTPS URLs and `s3://bucket/key` via a path-style endpoint
//! - ZIP64 archives, including directories past the 4 GiB mark
//! - STORED and DEFLATE entries
//! - Extended timestamp, Unix UID/GID and zip64 extra fields
//! - Best-effort charset detection for legacy entry names
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use s3unzip::{HttpRangeReader, ZipExtractor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let reader = Arc::new(HttpRangeReader::new("https://example.com/archive.zip".to_string()).await?);
//!     let extractor = ZipExtractor::new(reader);
//!
//!     let catalog = extractor.catalog().await?;
//!     for entry in &catalog {
//!         println!("{} ({} bytes)", entry.name, entry.uncompressed_size);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod listing;
pub mod output;
pub mod pattern;
pub mod zip;

pub use cli::Cli;
pub use error::{Error, Result, TransportError};
pub use io::{ArchiveStream, HttpRangeReader, LocalFileReader, ReadAt};
pub use zip::{Catalog, CatalogEntry, Positioner, ZipExtractor};
