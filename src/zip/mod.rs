//! ZIP archive parsing and extraction.
//!
//! This module reads ZIP archives from sources where every byte fetched
//! costs a request, so it never scans the archive body.
//!
//! ## Architecture
//!
//! - [`structures`]: fixed-layout records (headers, EOCD, zip64 trailer)
//! - [`extra`]: extra-field chains (zip64, extended timestamp, Unix UID/GID)
//! - [`locator`]: finding the Central Directory from the end of the file
//! - [`catalog`]: walking the Central Directory into a name-ordered index
//! - [`inflate`]: STORED/DEFLATE payloads behind a Local File Header
//! - [`extractor`]: entry positioning and the high-level extraction API
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end, preceded by the
//!    zip64 EOCD record and locator in zip64 archives
//!
//! Listing needs only the tail window and the Central Directory;
//! extraction then seeks straight to each entry's Local File Header.
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support (disk numbers are decoded, not followed)
//! - No CRC validation
//! - No BZIP2, LZMA, or other compression methods

pub mod catalog;
pub mod extra;
pub mod extractor;
pub mod inflate;
pub mod locator;
pub mod structures;
mod text;

pub use catalog::{Catalog, CatalogEntry};
pub use extra::{ExtraField, ExtraFields, Notice};
pub use extractor::{Positioner, ZipExtractor};
pub use locator::DirectoryLocation;
pub use structures::{CompressionMethod, DosDateTime, Record, Signature};
pub use text::REFERENCE_ENCODING;
