//! Fixed-layout ZIP records.
//!
//! Each record kind is introduced by a 4-byte signature. Decoding starts
//! *after* the signature: the caller reads it, maps it to a [`Signature`]
//! and dispatches to the matching decode routine (see [`Record::read`]).
//! All multi-byte fields are little-endian.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

use crate::error::{Error, Result};
use crate::io::{ArchiveStream, ReadAt};

use super::text;

/// All-ones value of a 32-bit field that defers to the zip64 extra field.
pub const SENTINEL_32: u32 = 0xFFFF_FFFF;
/// All-ones value of a 16-bit count or disk field.
pub const SENTINEL_16: u16 = 0xFFFF;

/// Record kinds, keyed by their 4-byte signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signature {
    LocalFileHeader,
    CentralDirectoryHeader,
    EndOfCentralDirectory,
    Zip64EndOfCentralDirectory,
    Zip64Locator,
}

impl Signature {
    pub const fn bytes(self) -> [u8; 4] {
        match self {
            Signature::LocalFileHeader => *b"PK\x03\x04",
            Signature::CentralDirectoryHeader => *b"PK\x01\x02",
            Signature::EndOfCentralDirectory => *b"PK\x05\x06",
            Signature::Zip64EndOfCentralDirectory => *b"PK\x06\x06",
            Signature::Zip64Locator => *b"PK\x06\x07",
        }
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        [
            Signature::LocalFileHeader,
            Signature::CentralDirectoryHeader,
            Signature::EndOfCentralDirectory,
            Signature::Zip64EndOfCentralDirectory,
            Signature::Zip64Locator,
        ]
        .into_iter()
        .find(|sig| sig.bytes() == bytes)
    }

    /// Size of the fixed part that follows the signature.
    pub const fn fixed_size(self) -> usize {
        match self {
            Signature::LocalFileHeader => LocalFileHeader::FIXED_SIZE,
            Signature::CentralDirectoryHeader => CentralDirectoryHeader::FIXED_SIZE,
            Signature::EndOfCentralDirectory => EndOfCentralDirectory::FIXED_SIZE,
            Signature::Zip64EndOfCentralDirectory => Zip64EndOfCentralDirectory::FIXED_SIZE,
            Signature::Zip64Locator => Zip64Locator::FIXED_SIZE,
        }
    }
}

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Legacy MS-DOS packed date and time, unpacked but not validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DosDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DosDateTime {
    pub fn from_dos(date: u16, time: u16) -> Self {
        Self {
            year: (date >> 9) + 1980,
            month: ((date >> 5) & 0x0F) as u8,
            day: (date & 0x1F) as u8,
            hour: (time >> 11) as u8,
            minute: ((time >> 5) & 0x3F) as u8,
            second: ((time & 0x1F) * 2) as u8,
        }
    }

    /// `YYYY-MM-DD HH:MM`, as used by the listing.
    pub fn to_minutes(&self) -> String {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

impl fmt::Display for DosDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

fn check_len(data: &[u8], need: usize, what: &str) -> Result<()> {
    if data.len() < need {
        return Err(Error::malformed(format!(
            "{what}: need {need} bytes, got {}",
            data.len()
        )));
    }
    Ok(())
}

/// Local File Header, fixed part (26 bytes after the signature).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_length: u16,
    pub extra_length: u16,
}

impl LocalFileHeader {
    pub const FIXED_SIZE: usize = 26;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, Self::FIXED_SIZE, "local file header")?;
        let mut cursor = Cursor::new(data);

        Ok(Self {
            version_needed: cursor.read_u16::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
            compression_method: CompressionMethod::from_u16(cursor.read_u16::<LittleEndian>()?),
            last_mod_time: cursor.read_u16::<LittleEndian>()?,
            last_mod_date: cursor.read_u16::<LittleEndian>()?,
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            name_length: cursor.read_u16::<LittleEndian>()?,
            extra_length: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Bit 3: sizes and crc live in a data descriptor after the payload.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & 0x0008 != 0
    }
}

/// Central Directory File Header, fixed part (42 bytes after the signature).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_length: u16,
    pub extra_length: u16,
    pub comment_length: u16,
    pub disk_number_start: u16,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub local_header_offset: u32,
}

impl CentralDirectoryHeader {
    pub const FIXED_SIZE: usize = 42;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, Self::FIXED_SIZE, "central directory file header")?;
        let mut cursor = Cursor::new(data);

        Ok(Self {
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
            compression_method: CompressionMethod::from_u16(cursor.read_u16::<LittleEndian>()?),
            last_mod_time: cursor.read_u16::<LittleEndian>()?,
            last_mod_date: cursor.read_u16::<LittleEndian>()?,
            crc32: cursor.read_u32::<LittleEndian>()?,
            compressed_size: cursor.read_u32::<LittleEndian>()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>()?,
            name_length: cursor.read_u16::<LittleEndian>()?,
            extra_length: cursor.read_u16::<LittleEndian>()?,
            comment_length: cursor.read_u16::<LittleEndian>()?,
            disk_number_start: cursor.read_u16::<LittleEndian>()?,
            internal_attrs: cursor.read_u16::<LittleEndian>()?,
            external_attrs: cursor.read_u32::<LittleEndian>()?,
            local_header_offset: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn modified(&self) -> DosDateTime {
        DosDateTime::from_dos(self.last_mod_date, self.last_mod_time)
    }
}

/// End of Central Directory (EOCD), 18 fixed bytes after the signature plus comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub dir_disk_number: u16,
    pub entries_this_disk: u16,
    pub entries_total: u16,
    pub directory_length: u32,
    pub directory_start: u32,
    pub comment_length: u16,
    pub comment: String,
}

impl EndOfCentralDirectory {
    pub const FIXED_SIZE: usize = 18;

    /// Decode from the bytes following the signature. The comment is
    /// clipped to whatever `data` holds past the fixed part.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, Self::FIXED_SIZE, "end of central directory")?;
        let mut cursor = Cursor::new(data);

        let disk_number = cursor.read_u16::<LittleEndian>()?;
        let dir_disk_number = cursor.read_u16::<LittleEndian>()?;
        let entries_this_disk = cursor.read_u16::<LittleEndian>()?;
        let entries_total = cursor.read_u16::<LittleEndian>()?;
        let directory_length = cursor.read_u32::<LittleEndian>()?;
        let directory_start = cursor.read_u32::<LittleEndian>()?;
        let comment_length = cursor.read_u16::<LittleEndian>()?;

        let rest = &data[Self::FIXED_SIZE..];
        let comment = &rest[..rest.len().min(comment_length as usize)];

        Ok(Self {
            disk_number,
            dir_disk_number,
            entries_this_disk,
            entries_total,
            directory_length,
            directory_start,
            comment_length,
            comment: text::decode(comment, 0),
        })
    }

    /// The directory start defers to the zip64 EOCD record.
    pub fn is_zip64(&self) -> bool {
        self.directory_start == SENTINEL_32
    }

    /// Any field at its sentinel value, i.e. a zip64 record is expected.
    pub fn has_sentinels(&self) -> bool {
        self.is_zip64()
            || self.directory_length == SENTINEL_32
            || self.entries_this_disk == SENTINEL_16
            || self.entries_total == SENTINEL_16
    }
}

/// ZIP64 End of Central Directory record: 52-byte fixed prefix after the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectory {
    pub record_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub dir_disk_number: u32,
    pub entries_this_disk: u64,
    pub entries_total: u64,
    pub directory_length: u64,
    pub directory_start: u64,
    pub comment: Vec<u8>,
}

impl Zip64EndOfCentralDirectory {
    pub const FIXED_SIZE: usize = 52;
    /// `record_size` counts everything after itself; 44 of those bytes are fixed.
    const SIZED_FIXED: u64 = 44;

    /// Decode the fixed prefix; the extensible data is left empty.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, Self::FIXED_SIZE, "zip64 end of central directory")?;
        let mut cursor = Cursor::new(data);

        Ok(Self {
            record_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            dir_disk_number: cursor.read_u32::<LittleEndian>()?,
            entries_this_disk: cursor.read_u64::<LittleEndian>()?,
            entries_total: cursor.read_u64::<LittleEndian>()?,
            directory_length: cursor.read_u64::<LittleEndian>()?,
            directory_start: cursor.read_u64::<LittleEndian>()?,
            comment: Vec::new(),
        })
    }

    /// Length of the extensible data area that follows the fixed prefix.
    pub fn comment_length(&self) -> Result<u64> {
        self.record_size.checked_sub(Self::SIZED_FIXED).ok_or_else(|| {
            Error::malformed(format!(
                "zip64 end of central directory size {} is below the fixed minimum",
                self.record_size
            ))
        })
    }
}

/// ZIP64 End of Central Directory Locator, 16 bytes after the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64Locator {
    pub eocd_disk_number: u32,
    pub eocd_offset: u64,
    pub total_disks: u32,
}

impl Zip64Locator {
    pub const FIXED_SIZE: usize = 16;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        check_len(data, Self::FIXED_SIZE, "zip64 end of central directory locator")?;
        let mut cursor = Cursor::new(data);

        Ok(Self {
            eocd_disk_number: cursor.read_u32::<LittleEndian>()?,
            eocd_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// A Local File Header together with its variable-length tail.
#[derive(Debug, Clone)]
pub struct LocalFileRecord {
    pub header: LocalFileHeader,
    pub name: String,
    pub raw_name: Vec<u8>,
    pub extra: Vec<u8>,
}

/// A Central Directory File Header together with its variable-length tail.
#[derive(Debug, Clone)]
pub struct CentralDirectoryRecord {
    pub header: CentralDirectoryHeader,
    pub name: String,
    pub raw_name: Vec<u8>,
    pub extra: Vec<u8>,
    pub comment: String,
}

/// One decoded record of any of the five kinds.
#[derive(Debug, Clone)]
pub enum Record {
    LocalFile(LocalFileRecord),
    CentralDirectory(CentralDirectoryRecord),
    EndOfCentralDirectory(EndOfCentralDirectory),
    Zip64EndOfCentralDirectory(Zip64EndOfCentralDirectory),
    Zip64Locator(Zip64Locator),
}

impl Record {
    /// Decode the record introduced by `sig` from the current stream
    /// position (just past the signature), consuming exactly its bytes.
    pub async fn read<R: ReadAt>(sig: Signature, stream: &mut ArchiveStream<R>) -> Result<Self> {
        let fixed = stream.read_exact(sig.fixed_size()).await?;

        let record = match sig {
            Signature::LocalFileHeader => {
                let header = LocalFileHeader::from_bytes(&fixed)?;
                let raw_name = stream.read_exact(header.name_length as usize).await?;
                let extra = stream.read_exact(header.extra_length as usize).await?;
                Record::LocalFile(LocalFileRecord {
                    name: text::decode(&raw_name, header.flags),
                    header,
                    raw_name,
                    extra,
                })
            }
            Signature::CentralDirectoryHeader => {
                let header = CentralDirectoryHeader::from_bytes(&fixed)?;
                let raw_name = stream.read_exact(header.name_length as usize).await?;
                let extra = stream.read_exact(header.extra_length as usize).await?;
                let comment = stream.read_exact(header.comment_length as usize).await?;
                Record::CentralDirectory(CentralDirectoryRecord {
                    name: text::decode(&raw_name, header.flags),
                    comment: text::decode(&comment, header.flags),
                    header,
                    raw_name,
                    extra,
                })
            }
            Signature::EndOfCentralDirectory => {
                let mut data = fixed;
                let comment_length = u16::from_le_bytes([data[16], data[17]]);
                data.extend(stream.read_exact(comment_length as usize).await?);
                Record::EndOfCentralDirectory(EndOfCentralDirectory::from_bytes(&data)?)
            }
            Signature::Zip64EndOfCentralDirectory => {
                let mut eocd = Zip64EndOfCentralDirectory::from_bytes(&fixed)?;
                let len = eocd.comment_length()?;
                let len = usize::try_from(len)
                    .map_err(|_| Error::malformed("zip64 extensible data too large"))?;
                eocd.comment = stream.read_exact(len).await?;
                Record::Zip64EndOfCentralDirectory(eocd)
            }
            Signature::Zip64Locator => Record::Zip64Locator(Zip64Locator::from_bytes(&fixed)?),
        };

        Ok(record)
    }

    pub fn signature(&self) -> Signature {
        match self {
            Record::LocalFile(_) => Signature::LocalFileHeader,
            Record::CentralDirectory(_) => Signature::CentralDirectoryHeader,
            Record::EndOfCentralDirectory(_) => Signature::EndOfCentralDirectory,
            Record::Zip64EndOfCentralDirectory(_) => Signature::Zip64EndOfCentralDirectory,
            Record::Zip64Locator(_) => Signature::Zip64Locator,
        }
    }
}
