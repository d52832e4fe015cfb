//! Extra field decoding.
//!
//! The extra-field area of a header is a chain of sub-records, each made
//! of a 2-byte id, a 2-byte payload length and the payload. Three ids are
//! understood (zip64, extended timestamp, Info-ZIP Unix UID/GID); every
//! other sub-record is kept as opaque bytes. Nothing in here fails: a
//! sub-record that cannot be decoded produces a [`Notice`] and the walk
//! goes on.
//!
//! References: APPNOTE.TXT 4.5, Info-ZIP `proginfo/extrafld.txt`.

use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;
use std::fmt;

use super::structures::{SENTINEL_16, SENTINEL_32};

pub const ZIP64_ID: u16 = 0x0001;
pub const UNIVERSAL_TIME_ID: u16 = 0x5455;
pub const UNIX_OWNERSHIP_ID: u16 = 0x7875;

/// Where the extra-field area came from. The extended timestamp is laid
/// out differently in the two places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    CentralDirectory,
    LocalHeader,
}

/// Extended timestamp (0x5455), POSIX seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniversalTime {
    pub modified: Option<u32>,
    pub accessed: Option<u32>,
    pub created: Option<u32>,
}

/// Info-ZIP "new" Unix extra field (0x7875).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnixOwnership {
    pub version: u8,
    pub uid: Option<u64>,
    pub gid: Option<u64>,
}

/// Zip64 extended information (0x0001).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Extension {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub local_header_offset: Option<u64>,
    pub disk_number: Option<u32>,
}

/// Sizes and position of an entry as a header states them, widened to 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub local_header_offset: u64,
    pub disk_number: u32,
}

/// Which header fields hold a sentinel and so expect a zip64 value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Expect {
    pub uncompressed_size: bool,
    pub compressed_size: bool,
    pub local_header_offset: bool,
    pub disk_number: bool,
}

impl Zip64Expect {
    pub fn from_header(uncompressed: u32, compressed: u32, offset: u32, disk: u16) -> Self {
        Self {
            uncompressed_size: uncompressed == SENTINEL_32,
            compressed_size: compressed == SENTINEL_32,
            local_header_offset: offset == SENTINEL_32,
            disk_number: disk == SENTINEL_16,
        }
    }

    fn any(&self) -> bool {
        self.uncompressed_size || self.compressed_size || self.local_header_offset || self.disk_number
    }
}

impl Zip64Extension {
    /// Full record: three u64 fields and the u32 disk number.
    pub const FULL_SIZE: usize = 28;

    /// Decode the payload. Fields are read strictly in their fixed order
    /// while the payload still holds enough bytes. A short record written
    /// for a header with sentinels only carries the sentinel fields; any
    /// other record is read positionally.
    pub fn decode(payload: &[u8], expect: Zip64Expect) -> Self {
        let positional = !expect.any() || payload.len() >= 24;
        let wanted = if positional {
            [true; 4]
        } else {
            [
                expect.uncompressed_size,
                expect.compressed_size,
                expect.local_header_offset,
                expect.disk_number,
            ]
        };

        let mut rest = payload;
        Self {
            uncompressed_size: take(&mut rest, wanted[0], 8).map(LittleEndian::read_u64),
            compressed_size: take(&mut rest, wanted[1], 8).map(LittleEndian::read_u64),
            local_header_offset: take(&mut rest, wanted[2], 8).map(LittleEndian::read_u64),
            disk_number: take(&mut rest, wanted[3], 4).map(LittleEndian::read_u32),
        }
    }

    /// Merge onto the provisional values from the header. Only fields
    /// present in this record change.
    pub fn apply(&self, provisional: EntryLocation) -> EntryLocation {
        EntryLocation {
            uncompressed_size: self.uncompressed_size.unwrap_or(provisional.uncompressed_size),
            compressed_size: self.compressed_size.unwrap_or(provisional.compressed_size),
            local_header_offset: self
                .local_header_offset
                .unwrap_or(provisional.local_header_offset),
            disk_number: self.disk_number.unwrap_or(provisional.disk_number),
        }
    }
}

/// One decoded sub-record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    UniversalTime(UniversalTime),
    UnixOwnership(UnixOwnership),
    Zip64(Zip64Extension),
    /// Unknown id, or a known id whose payload could not be decoded.
    Opaque(Vec<u8>),
}

/// Non-fatal findings while decoding an extra-field area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    UnsupportedExtraField { id: u16, length: u16 },
    UnsupportedUnixVersion(u8),
    Truncated { id: u16, declared: u16, available: usize },
    Malformed { id: u16, reason: &'static str },
    TrailingBytes(usize),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::UnsupportedExtraField { id, length } => {
                write!(f, "unknown extra field 0x{id:04x} ({length} bytes)")
            }
            Notice::UnsupportedUnixVersion(v) => {
                write!(f, "unknown extra field Unix uid/gid version: {v}")
            }
            Notice::Truncated { id, declared, available } => write!(
                f,
                "extra field 0x{id:04x} declares {declared} bytes, only {available} present"
            ),
            Notice::Malformed { id, reason } => write!(f, "extra field 0x{id:04x}: {reason}"),
            Notice::TrailingBytes(n) => write!(f, "{n} trailing bytes after extra fields"),
        }
    }
}

/// Decoded extra-field area, keyed by sub-record id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFields {
    fields: BTreeMap<u16, ExtraField>,
    notices: Vec<Notice>,
}

impl ExtraFields {
    /// Decode a whole extra-field area. `expect` describes the owning
    /// header's sentinel fields and only matters for the zip64 record.
    pub fn decode(bytes: &[u8], context: Context, expect: Zip64Expect) -> Self {
        let mut out = Self::default();
        let mut rest = bytes;

        while !rest.is_empty() {
            if rest.len() < 4 {
                out.notice(Notice::TrailingBytes(rest.len()));
                break;
            }
            let id = u16::from_le_bytes([rest[0], rest[1]]);
            let declared = u16::from_le_bytes([rest[2], rest[3]]);
            rest = &rest[4..];

            let payload = if rest.len() < declared as usize {
                out.notice(Notice::Truncated {
                    id,
                    declared,
                    available: rest.len(),
                });
                std::mem::take(&mut rest)
            } else {
                let (payload, tail) = rest.split_at(declared as usize);
                rest = tail;
                payload
            };

            let field = match id {
                ZIP64_ID => ExtraField::Zip64(Zip64Extension::decode(payload, expect)),
                UNIVERSAL_TIME_ID => {
                    ExtraField::UniversalTime(universal_time(declared, payload, context))
                }
                UNIX_OWNERSHIP_ID => match unix_ownership(payload) {
                    Ok(owner) => {
                        if owner.version != 1 {
                            out.notice(Notice::UnsupportedUnixVersion(owner.version));
                        }
                        ExtraField::UnixOwnership(owner)
                    }
                    Err(reason) => {
                        out.notice(Notice::Malformed { id, reason });
                        ExtraField::Opaque(payload.to_vec())
                    }
                },
                _ => {
                    out.notice(Notice::UnsupportedExtraField {
                        id,
                        length: declared,
                    });
                    ExtraField::Opaque(payload.to_vec())
                }
            };
            out.fields.insert(id, field);
        }

        out
    }

    fn notice(&mut self, notice: Notice) {
        log::warn!("{notice}");
        self.notices.push(notice);
    }

    pub fn get(&self, id: u16) -> Option<&ExtraField> {
        self.fields.get(&id)
    }

    pub fn zip64(&self) -> Option<&Zip64Extension> {
        match self.fields.get(&ZIP64_ID) {
            Some(ExtraField::Zip64(z)) => Some(z),
            _ => None,
        }
    }

    pub fn universal_time(&self) -> Option<&UniversalTime> {
        match self.fields.get(&UNIVERSAL_TIME_ID) {
            Some(ExtraField::UniversalTime(t)) => Some(t),
            _ => None,
        }
    }

    pub fn unix_ownership(&self) -> Option<&UnixOwnership> {
        match self.fields.get(&UNIX_OWNERSHIP_ID) {
            Some(ExtraField::UnixOwnership(o)) => Some(o),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &ExtraField)> {
        self.fields.iter().map(|(id, f)| (*id, f))
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Split off the next `width` bytes if the field is wanted and fits.
fn take<'a>(rest: &mut &'a [u8], wanted: bool, width: usize) -> Option<&'a [u8]> {
    if !wanted || rest.len() < width {
        return None;
    }
    let (head, tail) = rest.split_at(width);
    *rest = tail;
    Some(head)
}

fn read_u32_at(payload: &[u8], at: usize) -> Option<u32> {
    payload.get(at..at + 4).map(LittleEndian::read_u32)
}

/// The central directory copy holds at most the modification time; the
/// local copy holds whatever the flag byte announces.
fn universal_time(declared: u16, payload: &[u8], context: Context) -> UniversalTime {
    let mut out = UniversalTime::default();

    match context {
        Context::CentralDirectory => {
            if declared > 1 {
                out.modified = read_u32_at(payload, 1);
            }
        }
        Context::LocalHeader => {
            let Some((&flags, mut rest)) = payload.split_first() else {
                return out;
            };
            let slots = [&mut out.modified, &mut out.accessed, &mut out.created];
            for (bit, slot) in slots.into_iter().enumerate() {
                if flags & (1 << bit) != 0 && rest.len() >= 4 {
                    *slot = read_u32_at(rest, 0);
                    rest = &rest[4..];
                }
            }
        }
    }

    out
}

fn unix_ownership(payload: &[u8]) -> Result<UnixOwnership, &'static str> {
    let Some((&version, rest)) = payload.split_first() else {
        return Err("empty uid/gid record");
    };
    if version != 1 {
        return Ok(UnixOwnership {
            version,
            uid: None,
            gid: None,
        });
    }

    let (uid, rest) = sized_id(rest)?;
    let (gid, _) = sized_id(rest)?;
    Ok(UnixOwnership {
        version,
        uid: Some(uid),
        gid: Some(gid),
    })
}

/// A 1-byte length followed by a little-endian id of that many bytes.
fn sized_id(data: &[u8]) -> Result<(u64, &[u8]), &'static str> {
    let (&len, rest) = data.split_first().ok_or("missing id size")?;
    let len = len as usize;
    if len > 8 {
        return Err("id wider than 64 bits");
    }
    if rest.len() < len {
        return Err("truncated id");
    }
    let value = rest[..len]
        .iter()
        .rev()
        .fold(0u64, |acc, b| (acc << 8) | *b as u64);
    Ok((value, &rest[len..]))
}
