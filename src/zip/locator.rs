//! Locating the Central Directory.
//!
//! The End of Central Directory record sits in the last
//! `65536 + 18 + 4` bytes of the archive: a comment of at most 64 KiB,
//! the 18-byte fixed part and its signature. We read that window once and
//! search it. When the classic record's directory start is the 32-bit
//! sentinel, the real 64-bit start comes from the zip64 EOCD record,
//! normally found in the same window and otherwise reached through the
//! zip64 locator that precedes the classic record.

use std::io::SeekFrom;

use crate::error::{Error, Result, TransportError};
use crate::io::{ArchiveStream, ReadAt};

use super::structures::{
    EndOfCentralDirectory, Signature, Zip64EndOfCentralDirectory, Zip64Locator,
};

/// Largest comment, fixed EOCD part and its signature.
pub const SEARCH_WINDOW: u64 = 65536 + 18 + 4;

const EOCD_SIG: [u8; 4] = Signature::EndOfCentralDirectory.bytes();
const EOCD64_SIG: [u8; 4] = Signature::Zip64EndOfCentralDirectory.bytes();
const LOCATOR_SIG: [u8; 4] = Signature::Zip64Locator.bytes();

/// Where the Central Directory starts, and the trailer records that said so.
#[derive(Debug, Clone)]
pub struct DirectoryLocation {
    pub directory_start: u64,
    /// Absolute offset of the classic EOCD signature.
    pub eocd_offset: u64,
    pub eocd: EndOfCentralDirectory,
    pub zip64: Option<Zip64EndOfCentralDirectory>,
}

impl DirectoryLocation {
    pub fn is_zip64(&self) -> bool {
        self.zip64.is_some()
    }

    pub fn entries_total(&self) -> u64 {
        match &self.zip64 {
            Some(z) => z.entries_total,
            None => self.eocd.entries_total as u64,
        }
    }

    pub fn directory_length(&self) -> u64 {
        match &self.zip64 {
            Some(z) => z.directory_length,
            None => self.eocd.directory_length as u64,
        }
    }
}

/// Find the EOCD record and resolve the Central Directory start offset.
///
/// Fails with [`Error::DirectoryNotFound`] when the window holds no EOCD
/// signature, and with [`Error::MalformedArchive`] when the resolved
/// offset does not point at a directory.
pub async fn locate<R: ReadAt>(stream: &mut ArchiveStream<R>) -> Result<DirectoryLocation> {
    let window_start = match stream.seek(SeekFrom::End(-(SEARCH_WINDOW as i64))) {
        Ok(pos) => pos,
        // Shorter than the window: search the whole file.
        Err(TransportError::InvalidSeek(_)) => stream.seek(SeekFrom::Start(0))?,
        Err(e) => return Err(e.into()),
    };
    let window = stream.read(SEARCH_WINDOW as usize).await?;
    log::debug!(
        "searching {} bytes at offset {} for the end of central directory",
        window.len(),
        window_start
    );

    let at = find_eocd(&window).ok_or(Error::DirectoryNotFound)?;
    let eocd_offset = window_start + at as u64;
    let eocd = EndOfCentralDirectory::from_bytes(&window[at + 4..])?;
    log::debug!(
        "end of central directory at {eocd_offset}: {} entries, directory at {}",
        eocd.entries_total,
        eocd.directory_start
    );

    let zip64 = if eocd.is_zip64() {
        Some(read_zip64_eocd(stream, &window, window_start, at).await?)
    } else {
        None
    };

    let directory_start = match &zip64 {
        Some(z) => z.directory_start,
        None => eocd.directory_start as u64,
    };

    check_directory_start(stream, directory_start).await?;

    Ok(DirectoryLocation {
        directory_start,
        eocd_offset,
        eocd,
        zip64,
    })
}

/// Index of the EOCD signature within `window`.
///
/// Scans backwards and prefers the last candidate whose comment length
/// reaches exactly the end of the file; when no candidate fits, the last
/// complete one is used.
fn find_eocd(window: &[u8]) -> Option<usize> {
    let fixed = 4 + EndOfCentralDirectory::FIXED_SIZE;
    if window.len() < fixed {
        return None;
    }

    let mut fallback = None;
    for i in (0..=window.len() - fixed).rev() {
        if window[i..i + 4] != EOCD_SIG {
            continue;
        }
        let comment_len = u16::from_le_bytes([window[i + 20], window[i + 21]]) as usize;
        if comment_len == window.len() - i - fixed {
            return Some(i);
        }
        fallback.get_or_insert(i);
    }

    if fallback.is_some() {
        log::warn!("end of central directory comment length does not match the file end");
    }
    fallback
}

async fn read_zip64_eocd<R: ReadAt>(
    stream: &mut ArchiveStream<R>,
    window: &[u8],
    window_start: u64,
    eocd_at: usize,
) -> Result<Zip64EndOfCentralDirectory> {
    // The locator, when present, sits right before the classic record.
    let locator = eocd_at
        .checked_sub(4 + Zip64Locator::FIXED_SIZE)
        .filter(|&i| window[i..i + 4] == LOCATOR_SIG)
        .map(|i| Zip64Locator::from_bytes(&window[i + 4..eocd_at]))
        .transpose()?;

    let fixed = 4 + Zip64EndOfCentralDirectory::FIXED_SIZE;
    let candidates: Vec<usize> = (0..eocd_at.saturating_sub(fixed - 1))
        .filter(|&i| window[i..i + 4] == EOCD64_SIG)
        .collect();

    // With a locator, only the record at its offset counts.
    let in_window = match &locator {
        Some(loc) => candidates
            .iter()
            .copied()
            .find(|&i| window_start + i as u64 == loc.eocd_offset),
        None => candidates.last().copied(),
    };

    if let Some(i) = in_window {
        log::debug!("zip64 end of central directory at {}", window_start + i as u64);
        return Zip64EndOfCentralDirectory::from_bytes(&window[i + 4..i + fixed]);
    }

    let Some(locator) = locator else {
        return Err(Error::malformed(
            "directory start is a zip64 sentinel but no zip64 end of central directory was found",
        ));
    };

    log::debug!(
        "zip64 end of central directory outside the search window, following locator to {}",
        locator.eocd_offset
    );
    stream.seek(SeekFrom::Start(locator.eocd_offset))?;
    let bytes = stream.read_exact(fixed).await?;
    if bytes[..4] != EOCD64_SIG {
        return Err(Error::malformed(format!(
            "no zip64 end of central directory at offset {}",
            locator.eocd_offset
        )));
    }
    Zip64EndOfCentralDirectory::from_bytes(&bytes[4..])
}

/// The offset must be inside the file and start a directory record. An
/// empty archive's directory start points straight at its trailer.
async fn check_directory_start<R: ReadAt>(stream: &mut ArchiveStream<R>, start: u64) -> Result<()> {
    if start >= stream.len() {
        return Err(Error::malformed(format!(
            "central directory offset {start} is beyond the end of the archive ({} bytes)",
            stream.len()
        )));
    }

    stream.seek(SeekFrom::Start(start))?;
    let sig = stream.read_exact(4).await?;
    let sig = Signature::from_bytes([sig[0], sig[1], sig[2], sig[3]]);
    match sig {
        Some(
            Signature::CentralDirectoryHeader
            | Signature::EndOfCentralDirectory
            | Signature::Zip64EndOfCentralDirectory,
        ) => Ok(()),
        _ => Err(Error::malformed(format!(
            "no central directory signature at offset {start}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn eocd(directory_start: u32, comment: &[u8]) -> Vec<u8> {
        let mut v = EOCD_SIG.to_vec();
        v.extend([0u8; 8]);
        v.extend(0u32.to_le_bytes());
        v.extend(directory_start.to_le_bytes());
        v.extend((comment.len() as u16).to_le_bytes());
        v.extend(comment);
        v
    }

    #[test]
    fn finds_signature_with_comment() {
        let mut data = vec![0u8; 10];
        data.extend(eocd(0, b"a comment"));
        assert_eq!(find_eocd(&data), Some(10));
    }

    #[test]
    fn prefers_candidate_that_reaches_file_end() {
        // A comment that itself contains a bogus signature.
        let mut comment = eocd(99, b"");
        comment.extend(b"tail");
        let mut data = vec![0u8; 5];
        data.extend(eocd(0, &comment));
        assert_eq!(find_eocd(&data), Some(5));
    }

    #[test]
    fn missing_signature() {
        assert_eq!(find_eocd(&[0u8; 100]), None);
        assert_eq!(find_eocd(b"PK\x05\x06"), None);
    }

    #[tokio::test]
    async fn empty_archive_points_at_its_trailer() {
        let data = eocd(0, b"");
        let mut stream = ArchiveStream::new(Arc::new(data));
        let location = locate(&mut stream).await.unwrap();
        assert_eq!(location.directory_start, 0);
        assert_eq!(location.eocd_offset, 0);
        assert!(!location.is_zip64());
    }

    #[tokio::test]
    async fn no_trailer_is_directory_not_found() {
        let mut stream = ArchiveStream::new(Arc::new(vec![7u8; 300]));
        let err = locate(&mut stream).await.unwrap_err();
        assert!(matches!(err, Error::DirectoryNotFound));
    }

    #[tokio::test]
    async fn offset_without_directory_is_malformed() {
        let mut data = vec![0u8; 40];
        data.extend(eocd(12, b""));
        let mut stream = ArchiveStream::new(Arc::new(data));
        let err = locate(&mut stream).await.unwrap_err();
        assert!(matches!(err, Error::MalformedArchive(_)));
    }

    #[tokio::test]
    async fn sentinel_without_zip64_record_is_malformed() {
        let data = eocd(u32::MAX, b"");
        let mut stream = ArchiveStream::new(Arc::new(data));
        let err = locate(&mut stream).await.unwrap_err();
        assert!(matches!(err, Error::MalformedArchive(_)));
    }
}
