//! Walking the Central Directory into a [`Catalog`].

use std::collections::HashMap;
use std::io::SeekFrom;

use crate::error::{Error, Result};
use crate::io::{ArchiveStream, ReadAt};

use super::extra::{Context, EntryLocation, ExtraFields, Zip64Expect};
use super::locator::DirectoryLocation;
use super::structures::{CentralDirectoryRecord, CompressionMethod, DosDateTime, Record, Signature};

/// One archive member as the Central Directory describes it, with any
/// zip64 overrides already applied.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name: String,
    pub raw_name: Vec<u8>,
    pub compression_method: CompressionMethod,
    pub flags: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub modified: DosDateTime,
    pub local_header_offset: u64,
    pub disk_number_start: u32,
    pub extra_fields: ExtraFields,
    pub comment: String,
}

impl CatalogEntry {
    /// Build the final entry from a parsed header: the header's own values
    /// form the provisional location, and the zip64 record, if any,
    /// overrides it in a single pass.
    pub fn from_record(record: CentralDirectoryRecord) -> Self {
        let header = &record.header;
        let provisional = EntryLocation {
            uncompressed_size: header.uncompressed_size as u64,
            compressed_size: header.compressed_size as u64,
            local_header_offset: header.local_header_offset as u64,
            disk_number: header.disk_number_start as u32,
        };
        let expect = Zip64Expect::from_header(
            header.uncompressed_size,
            header.compressed_size,
            header.local_header_offset,
            header.disk_number_start,
        );

        let extra_fields = ExtraFields::decode(&record.extra, Context::CentralDirectory, expect);
        let location = match extra_fields.zip64() {
            Some(zip64) => zip64.apply(provisional),
            None => provisional,
        };

        Self {
            modified: header.modified(),
            compression_method: header.compression_method,
            flags: header.flags,
            crc32: header.crc32,
            compressed_size: location.compressed_size,
            uncompressed_size: location.uncompressed_size,
            local_header_offset: location.local_header_offset,
            disk_number_start: location.disk_number,
            extra_fields,
            name: record.name,
            raw_name: record.raw_name,
            comment: record.comment,
        }
    }

    /// Directory entries end with '/'
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Modification time from the extended timestamp field, POSIX seconds.
    pub fn modified_unix(&self) -> Option<u32> {
        self.extra_fields.universal_time().and_then(|t| t.modified)
    }
}

/// Entries in Central Directory order, addressable by name.
///
/// A name seen twice keeps its first position but takes the later
/// entry's values, as the later record on disk wins.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by name; returns the replaced entry.
    pub fn upsert(&mut self, entry: CatalogEntry) -> Option<CatalogEntry> {
        match self.index.get(&entry.name) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i], entry)),
            None => {
                self.index.insert(entry.name.clone(), self.entries.len());
                self.entries.push(entry);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CatalogEntry> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a CatalogEntry;
    type IntoIter = std::slice::Iter<'a, CatalogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Walk the Central Directory starting at `location.directory_start`.
///
/// The walk reads one signature at a time. Directory headers become
/// catalog entries; trailer records are parsed and skipped; anything else,
/// or the end of the stream, ends the walk normally.
pub async fn build<R: ReadAt>(
    stream: &mut ArchiveStream<R>,
    location: &DirectoryLocation,
) -> Result<Catalog> {
    let archive_len = stream.len();
    let mut catalog = Catalog::new();

    stream.seek(SeekFrom::Start(location.directory_start))?;

    loop {
        let at = stream.position();
        let sig = stream.read(4).await?;
        let Ok(sig) = <[u8; 4]>::try_from(sig.as_slice()) else {
            log::debug!("central directory walk reached end of archive at {at}");
            break;
        };

        let Some(kind) = Signature::from_bytes(sig).filter(|s| *s != Signature::LocalFileHeader)
        else {
            log::debug!(
                "central directory walk stopped at {at}: unknown header 0x{:08x}",
                u32::from_le_bytes(sig)
            );
            break;
        };

        match Record::read(kind, stream).await? {
            Record::CentralDirectory(record) => {
                let entry = CatalogEntry::from_record(record);
                if entry.local_header_offset >= archive_len {
                    return Err(Error::malformed(format!(
                        "{}: local header offset {} is beyond the end of the archive ({} bytes)",
                        entry.name, entry.local_header_offset, archive_len
                    )));
                }
                log::debug!(
                    "{}: {} bytes at offset {}",
                    entry.name,
                    entry.uncompressed_size,
                    entry.local_header_offset
                );
                if let Some(previous) = catalog.upsert(entry) {
                    log::debug!("{}: duplicate name, later entry wins", previous.name);
                }
            }
            other => log::debug!("skipping {:?} at {at}", other.signature()),
        }
    }

    if catalog.len() as u64 != location.entries_total() {
        log::debug!(
            "catalog holds {} names, end of central directory declares {} entries",
            catalog.len(),
            location.entries_total()
        );
    }

    Ok(catalog)
}
