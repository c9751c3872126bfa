use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{PgArchiveError, Result};
use crate::format::custom::io::DumpIO;

const OUTPUT_CHUNK_SIZE: usize = 512 * 1024;

/// Reads and writes the chunked, possibly-zlib-compressed payload that
/// follows a `BLK_DATA` tag. Pluggable so a caller could swap in another
/// codec; `ZlibCompressor` is the only implementation this engine ships,
/// matching its single supported on-wire compression method.
pub trait Compressor {
    /// Read a full chunk-terminated block from `reader` and return its
    /// decompressed bytes.
    fn decompress_stream<R: Read>(&self, dio: &DumpIO, reader: &mut R) -> Result<Vec<u8>>;

    /// Compress `data` and write it as a chunk-terminated block.
    fn compress_to_file<W: Write>(&self, dio: &DumpIO, writer: &mut W, data: &[u8]) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ZlibCompressor;

impl Compressor for ZlibCompressor {
    fn decompress_stream<R: Read>(&self, dio: &DumpIO, reader: &mut R) -> Result<Vec<u8>> {
        let mut compressed = Vec::new();
        loop {
            let chunk_len = dio.read_int(reader)?;
            if chunk_len == 0 {
                break;
            }
            let len = chunk_len.unsigned_abs() as usize;
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf)?;
            compressed.extend_from_slice(&buf);
        }

        if compressed.is_empty() {
            return Ok(Vec::new());
        }

        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| PgArchiveError::InvalidFormat(format!("zlib decompression failed: {e}")))?;
        Ok(out)
    }

    fn compress_to_file<W: Write>(&self, dio: &DumpIO, writer: &mut W, data: &[u8]) -> Result<()> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(6));
        encoder
            .write_all(data)
            .map_err(|e| PgArchiveError::InvalidFormat(format!("zlib compression failed: {e}")))?;
        let compressed = encoder
            .finish()
            .map_err(|e| PgArchiveError::InvalidFormat(format!("zlib finish failed: {e}")))?;

        let mut offset = 0;
        while offset < compressed.len() {
            let end = (offset + OUTPUT_CHUNK_SIZE).min(compressed.len());
            let chunk = &compressed[offset..end];
            dio.write_int(writer, chunk.len() as i64)?;
            writer.write_all(chunk)?;
            offset = end;
        }
        dio.write_int(writer, 0)
    }
}

/// Reads an uncompressed chunk-terminated block, used for both reading
/// archives written without compression and for this engine's writer,
/// which always emits uncompressed data (see DESIGN.md).
pub fn read_uncompressed_stream<R: Read>(dio: &DumpIO, reader: &mut R) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    loop {
        let chunk_len = dio.read_int(reader)?;
        if chunk_len == 0 {
            break;
        }
        let len = chunk_len.unsigned_abs() as usize;
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf)?;
        data.extend_from_slice(&buf);
    }
    Ok(data)
}

pub fn write_uncompressed_stream<W: Write>(dio: &DumpIO, writer: &mut W, data: &[u8]) -> Result<()> {
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + OUTPUT_CHUNK_SIZE).min(data.len());
        let chunk = &data[offset..end];
        dio.write_int(writer, chunk.len() as i64)?;
        writer.write_all(chunk)?;
        offset = end;
    }
    dio.write_int(writer, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn uncompressed_roundtrip() {
        let dio = DumpIO::new(4, 8);
        let mut buf = Vec::new();
        write_uncompressed_stream(&dio, &mut buf, b"hello\tworld\n").unwrap();
        let mut cur = Cursor::new(buf);
        let out = read_uncompressed_stream(&dio, &mut cur).unwrap();
        assert_eq!(out, b"hello\tworld\n");
    }

    #[test]
    fn zlib_roundtrip() {
        let dio = DumpIO::new(4, 8);
        let mut buf = Vec::new();
        let z = ZlibCompressor;
        z.compress_to_file(&dio, &mut buf, b"hello\tworld\n").unwrap();
        let mut cur = Cursor::new(buf);
        let out = z.decompress_stream(&dio, &mut cur).unwrap();
        assert_eq!(out, b"hello\tworld\n");
    }
}
