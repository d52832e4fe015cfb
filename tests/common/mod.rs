//! Archive builders and readers shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;

use s3unzip::{ReadAt, TransportError};

/// DOS date/time for 2023-12-31 12:51:02.
pub const NEW_YEARS_EVE: (u16, u16) = (
    (43 << 9) | (12 << 5) | 31,
    (12 << 11) | (51 << 5) | 1,
);

/// One member of an archive under construction.
#[derive(Clone)]
pub struct TestEntry {
    pub name: Vec<u8>,
    pub data: Vec<u8>,
    pub deflate: bool,
    pub flags: u16,
    pub date: u16,
    pub time: u16,
    pub local_extra: Vec<u8>,
    pub central_extra: Vec<u8>,
}

impl TestEntry {
    pub fn stored(name: &str, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            data: data.into(),
            deflate: false,
            flags: 0,
            date: NEW_YEARS_EVE.0,
            time: NEW_YEARS_EVE.1,
            local_extra: Vec::new(),
            central_extra: Vec::new(),
        }
    }

    pub fn deflated(name: &str, data: impl Into<Vec<u8>>) -> Self {
        Self {
            deflate: true,
            ..Self::stored(name, data)
        }
    }

    pub fn with_raw_name(mut self, name: &[u8]) -> Self {
        self.name = name.to_vec();
        self
    }

    pub fn with_local_extra(mut self, extra: Vec<u8>) -> Self {
        self.local_extra = extra;
        self
    }

    pub fn with_central_extra(mut self, extra: Vec<u8>) -> Self {
        self.central_extra = extra;
        self
    }

    fn payload(&self) -> Vec<u8> {
        if !self.deflate {
            return self.data.clone();
        }
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.data).unwrap();
        encoder.finish().unwrap()
    }

    fn method(&self) -> u16 {
        if self.deflate { 8 } else { 0 }
    }
}

/// Serialized extra sub-record.
pub fn extra(id: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn local_header(entry: &TestEntry, compressed_len: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"PK\x03\x04");
    out.extend_from_slice(&20u16.to_le_bytes());
    out.extend_from_slice(&entry.flags.to_le_bytes());
    out.extend_from_slice(&entry.method().to_le_bytes());
    out.extend_from_slice(&entry.time.to_le_bytes());
    out.extend_from_slice(&entry.date.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&compressed_len.to_le_bytes());
    out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
    out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entry.local_extra.len() as u16).to_le_bytes());
    out.extend_from_slice(&entry.name);
    out.extend_from_slice(&entry.local_extra);
    out
}

pub fn central_header(
    entry: &TestEntry,
    compressed_len: u32,
    uncompressed_len: u32,
    offset: u32,
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"PK\x01\x02");
    out.extend_from_slice(&0x031eu16.to_le_bytes());
    out.extend_from_slice(&20u16.to_le_bytes());
    out.extend_from_slice(&entry.flags.to_le_bytes());
    out.extend_from_slice(&entry.method().to_le_bytes());
    out.extend_from_slice(&entry.time.to_le_bytes());
    out.extend_from_slice(&entry.date.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&compressed_len.to_le_bytes());
    out.extend_from_slice(&uncompressed_len.to_le_bytes());
    out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entry.central_extra.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&offset.to_le_bytes());
    out.extend_from_slice(&entry.name);
    out.extend_from_slice(&entry.central_extra);
    out
}

pub fn end_of_central_directory(entries: u16, cd_len: u32, cd_start: u32, comment: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"PK\x05\x06");
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&entries.to_le_bytes());
    out.extend_from_slice(&entries.to_le_bytes());
    out.extend_from_slice(&cd_len.to_le_bytes());
    out.extend_from_slice(&cd_start.to_le_bytes());
    out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
    out.extend_from_slice(comment);
    out
}

/// Zip64 EOCD record followed by `extensible` bytes of extensible data.
pub fn zip64_end_of_central_directory(entries: u64, cd_len: u64, cd_start: u64, extensible: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"PK\x06\x06");
    out.extend_from_slice(&(44 + extensible as u64).to_le_bytes());
    out.extend_from_slice(&45u16.to_le_bytes());
    out.extend_from_slice(&45u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&entries.to_le_bytes());
    out.extend_from_slice(&entries.to_le_bytes());
    out.extend_from_slice(&cd_len.to_le_bytes());
    out.extend_from_slice(&cd_start.to_le_bytes());
    out.resize(out.len() + extensible, 0);
    out
}

pub fn zip64_locator(eocd64_offset: u64) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"PK\x06\x07");
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&eocd64_offset.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out
}

/// Lay out `entries` as a classic ZIP archive, in order.
pub fn build_zip(entries: &[TestEntry], comment: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut directory = Vec::new();

    for entry in entries {
        let payload = entry.payload();
        let offset = out.len() as u32;
        out.extend_from_slice(&local_header(entry, payload.len() as u32));
        out.extend_from_slice(&payload);
        directory.extend_from_slice(&central_header(
            entry,
            payload.len() as u32,
            entry.data.len() as u32,
            offset,
        ));
    }

    let cd_start = out.len() as u32;
    out.extend_from_slice(&directory);
    out.extend_from_slice(&end_of_central_directory(
        entries.len() as u16,
        directory.len() as u32,
        cd_start,
        comment,
    ));
    out
}

/// The single-entry archive `empty.txt` with extended timestamp and Unix
/// UID/GID fields, as written by Info-ZIP.
pub fn empty_txt_archive() -> Vec<u8> {
    let mtime = 1_704_027_062u32.to_le_bytes();

    let mut local_ut = vec![3u8];
    local_ut.extend_from_slice(&mtime);
    local_ut.extend_from_slice(&mtime);
    let mut central_ut = vec![3u8];
    central_ut.extend_from_slice(&mtime);

    let mut ux = vec![1u8, 4];
    ux.extend_from_slice(&1000u32.to_le_bytes());
    ux.push(4);
    ux.extend_from_slice(&1000u32.to_le_bytes());

    let local_extra = [extra(0x5455, &local_ut), extra(0x7875, &ux)].concat();
    let central_extra = [extra(0x5455, &central_ut), extra(0x7875, &ux)].concat();

    build_zip(
        &[TestEntry::stored("empty.txt", Vec::new())
            .with_local_extra(local_extra)
            .with_central_extra(central_extra)],
        b"",
    )
}

/// Repeatable pseudo-random content.
pub fn content(seed: u32, len: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

/// A logical archive mostly made of zeros, with real bytes only where
/// segments are placed. Lets tests use offsets past 4 GiB cheaply.
pub struct SparseArchive {
    size: u64,
    segments: Vec<(u64, Vec<u8>)>,
}

impl SparseArchive {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            segments: Vec::new(),
        }
    }

    pub fn put(&mut self, offset: u64, bytes: Vec<u8>) {
        self.segments.push((offset, bytes));
    }
}

#[async_trait]
impl ReadAt for SparseArchive {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, TransportError> {
        if offset >= self.size {
            return Ok(0);
        }
        let n = (self.size - offset).min(buf.len() as u64) as usize;
        let buf = &mut buf[..n];
        buf.fill(0);

        let end = offset + n as u64;
        for (start, bytes) in &self.segments {
            let seg_end = start + bytes.len() as u64;
            if seg_end <= offset || *start >= end {
                continue;
            }
            let from = offset.max(*start);
            let to = end.min(seg_end);
            let dst = (from - offset) as usize;
            let src = (from - start) as usize;
            let len = (to - from) as usize;
            buf[dst..dst + len].copy_from_slice(&bytes[src..src + len]);
        }
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
