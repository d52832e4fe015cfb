//! Decompressing one entry from a stream positioned at its Local File Header.
//!
//! STORED payloads are copied, DEFLATE payloads go through a raw
//! `flate2` inflater. Output is written chunk by chunk so memory use does
//! not depend on the entry size.

use flate2::{Decompress, FlushDecompress, Status};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::io::{ArchiveStream, ReadAt};

use super::catalog::CatalogEntry;
use super::extra::{Context, EntryLocation, ExtraFields, Zip64Expect};
use super::structures::{CompressionMethod, Record, Signature};

const CHUNK_SIZE: usize = 64 * 1024;

/// Decompress the entry whose Local File Header starts at the stream's
/// current position into `sink`, returning the number of bytes written.
///
/// The whole compressed payload is always consumed, even when the sink
/// only cares about a prefix.
pub async fn decompress_entry<R, W>(
    stream: &mut ArchiveStream<R>,
    entry: &CatalogEntry,
    sink: &mut W,
) -> Result<u64>
where
    R: ReadAt,
    W: AsyncWrite + Unpin + ?Sized,
{
    let at = stream.position();
    let sig = stream.read_exact(4).await?;
    if sig[..] != Signature::LocalFileHeader.bytes() {
        return Err(Error::malformed(format!(
            "{}: no local file header at offset {at}",
            entry.name
        )));
    }

    let Record::LocalFile(local) = Record::read(Signature::LocalFileHeader, stream).await? else {
        return Err(Error::malformed(format!("{}: unreadable local file header", entry.name)));
    };

    let header = &local.header;
    let extra = ExtraFields::decode(
        &local.extra,
        Context::LocalHeader,
        Zip64Expect::from_header(header.uncompressed_size, header.compressed_size, 0, 0),
    );
    let provisional = EntryLocation {
        uncompressed_size: header.uncompressed_size as u64,
        compressed_size: header.compressed_size as u64,
        local_header_offset: at,
        disk_number: 0,
    };
    let local_sizes = match extra.zip64() {
        Some(zip64) => zip64.apply(provisional),
        None => provisional,
    };

    // The central directory is the authority on sizes; the local header
    // may defer them to a data descriptor.
    if !header.has_data_descriptor() && local_sizes.compressed_size != entry.compressed_size {
        log::warn!(
            "{}: local header says {} compressed bytes, central directory says {}",
            entry.name,
            local_sizes.compressed_size,
            entry.compressed_size
        );
    }
    if header.compression_method != entry.compression_method {
        log::warn!(
            "{}: local header compression method {} differs from central directory {}",
            entry.name,
            header.compression_method.as_u16(),
            entry.compression_method.as_u16()
        );
    }
    if local.name != entry.name {
        log::debug!("{}: local header names it {}", entry.name, local.name);
    }

    let written = match entry.compression_method {
        CompressionMethod::Stored => copy_stored(stream, entry, sink).await?,
        CompressionMethod::Deflate => inflate(stream, entry, sink).await?,
        CompressionMethod::Unknown(m) => return Err(Error::UnsupportedCompression(m)),
    };
    sink.flush().await.map_err(Error::Output)?;

    if written != entry.uncompressed_size {
        log::warn!(
            "{}: wrote {written} bytes, central directory says {}",
            entry.name,
            entry.uncompressed_size
        );
    }

    Ok(written)
}

async fn next_chunk<R: ReadAt>(
    stream: &mut ArchiveStream<R>,
    entry: &CatalogEntry,
    remaining: &mut u64,
) -> Result<Vec<u8>> {
    let want = (*remaining).min(CHUNK_SIZE as u64) as usize;
    let chunk = stream.read(want).await?;
    if chunk.len() < want {
        return Err(Error::malformed(format!(
            "{}: compressed data truncated, {} bytes missing",
            entry.name,
            *remaining - chunk.len() as u64
        )));
    }
    *remaining -= chunk.len() as u64;
    Ok(chunk)
}

async fn copy_stored<R, W>(
    stream: &mut ArchiveStream<R>,
    entry: &CatalogEntry,
    sink: &mut W,
) -> Result<u64>
where
    R: ReadAt,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut remaining = entry.compressed_size;
    while remaining > 0 {
        let chunk = next_chunk(stream, entry, &mut remaining).await?;
        sink.write_all(&chunk).await.map_err(Error::Output)?;
    }
    Ok(entry.compressed_size)
}

async fn inflate<R, W>(stream: &mut ArchiveStream<R>, entry: &CatalogEntry, sink: &mut W) -> Result<u64>
where
    R: ReadAt,
    W: AsyncWrite + Unpin + ?Sized,
{
    // Never ask for `Finish`: a one-shot finish fails when the output does
    // not fit the buffer. The stream ends when the decoder reports it.
    let mut decoder = Decompress::new(false);
    let mut out = vec![0u8; CHUNK_SIZE];
    let mut remaining = entry.compressed_size;
    let mut written = 0u64;

    loop {
        let input = if remaining > 0 {
            next_chunk(stream, entry, &mut remaining).await?
        } else {
            Vec::new()
        };

        let mut pos = 0;
        loop {
            let (in_before, out_before) = (decoder.total_in(), decoder.total_out());
            let status = decoder
                .decompress(&input[pos..], &mut out, FlushDecompress::None)
                .map_err(|e| Error::malformed(format!("{}: {e}", entry.name)))?;
            let consumed = (decoder.total_in() - in_before) as usize;
            let produced = (decoder.total_out() - out_before) as usize;
            pos += consumed;

            sink.write_all(&out[..produced]).await.map_err(Error::Output)?;
            written += produced as u64;

            if status == Status::StreamEnd {
                // Drain what is left so the payload is consumed to the end.
                while remaining > 0 {
                    next_chunk(stream, entry, &mut remaining).await?;
                }
                return Ok(written);
            }
            if consumed == 0 && produced == 0 {
                break;
            }
        }

        if remaining == 0 || pos < input.len() {
            return Err(Error::malformed(format!(
                "{}: deflate stream ended before its final block",
                entry.name
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::structures::DosDateTime;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;
    use std::sync::Arc;

    fn local_header(method: u16, payload: &[u8], size: u32) -> Vec<u8> {
        let mut v = Signature::LocalFileHeader.bytes().to_vec();
        v.extend(20u16.to_le_bytes());
        v.extend(0u16.to_le_bytes());
        v.extend(method.to_le_bytes());
        v.extend([0u8; 8]); // time, date, crc
        v.extend((payload.len() as u32).to_le_bytes());
        v.extend(size.to_le_bytes());
        v.extend(5u16.to_le_bytes());
        v.extend(0u16.to_le_bytes());
        v.extend(b"a.txt");
        v.extend(payload);
        v
    }

    fn entry(method: CompressionMethod, compressed: u64, uncompressed: u64) -> CatalogEntry {
        CatalogEntry {
            name: "a.txt".into(),
            raw_name: b"a.txt".to_vec(),
            compression_method: method,
            flags: 0,
            crc32: 0,
            compressed_size: compressed,
            uncompressed_size: uncompressed,
            modified: DosDateTime::from_dos(0x21, 0),
            local_header_offset: 0,
            disk_number_start: 0,
            extra_fields: ExtraFields::default(),
            comment: String::new(),
        }
    }

    #[tokio::test]
    async fn inflates_deflate_entry() {
        let text = b"hello hello hello hello hello".repeat(5000);
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&text).unwrap();
        let compressed = enc.finish().unwrap();

        let archive = local_header(8, &compressed, text.len() as u32);
        let mut stream = ArchiveStream::with_buffer_size(Arc::new(archive), 1024);
        let e = entry(CompressionMethod::Deflate, compressed.len() as u64, text.len() as u64);

        let mut out = Vec::new();
        let n = decompress_entry(&mut stream, &e, &mut out).await.unwrap();
        assert_eq!(n, text.len() as u64);
        assert_eq!(out, text);
    }

    #[tokio::test]
    async fn small_payload_inflating_past_one_buffer() {
        let text = b"0123456789abcdef".repeat(12_500);
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::best());
        enc.write_all(&text).unwrap();
        let compressed = enc.finish().unwrap();
        assert!(compressed.len() < CHUNK_SIZE && text.len() > CHUNK_SIZE);

        let archive = local_header(8, &compressed, text.len() as u32);
        let mut stream = ArchiveStream::new(Arc::new(archive));
        let e = entry(CompressionMethod::Deflate, compressed.len() as u64, text.len() as u64);

        let mut out = Vec::new();
        let n = decompress_entry(&mut stream, &e, &mut out).await.unwrap();
        assert_eq!(n, 200_000);
        assert_eq!(out, text);
    }

    #[tokio::test]
    async fn copies_stored_entry() {
        let archive = local_header(0, b"plain", 5);
        let mut stream = ArchiveStream::new(Arc::new(archive));
        let mut out = Vec::new();
        decompress_entry(&mut stream, &entry(CompressionMethod::Stored, 5, 5), &mut out)
            .await
            .unwrap();
        assert_eq!(out, b"plain");
    }

    #[tokio::test]
    async fn rejects_missing_local_header() {
        let mut stream = ArchiveStream::new(Arc::new(vec![0u8; 64]));
        let mut out = Vec::new();
        let err = decompress_entry(&mut stream, &entry(CompressionMethod::Stored, 5, 5), &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedArchive(_)));
    }

    #[tokio::test]
    async fn unsupported_method() {
        let archive = local_header(14, b"xx", 2);
        let mut stream = ArchiveStream::new(Arc::new(archive));
        let mut out = Vec::new();
        let err = decompress_entry(
            &mut stream,
            &entry(CompressionMethod::Unknown(14), 2, 2),
            &mut out,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedCompression(14)));
    }

    #[tokio::test]
    async fn truncated_payload_is_malformed() {
        let archive = local_header(0, b"abc", 10);
        let mut stream = ArchiveStream::new(Arc::new(archive));
        let mut out = Vec::new();
        let err = decompress_entry(&mut stream, &entry(CompressionMethod::Stored, 10, 10), &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedArchive(_)));
    }
}
