use std::io::{Read, Write};

use chrono::NaiveDateTime;

use crate::error::{PgArchiveError, Result};
use crate::format::custom::constants::{MAX_VER, MIN_VER};
use crate::format::custom::io::DumpIO;
use crate::format::MAGIC_HEADER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    None,
    Zlib,
}

/// The fixed-layout preamble of a custom-format archive: magic, version
/// triple, integer/offset widths, format byte, compression method, dump
/// timestamp, and the three descriptive strings pg_dump always writes
/// ahead of the table of contents.
#[derive(Debug, Clone)]
pub struct Header {
    pub vmaj: u8,
    pub vmin: u8,
    pub vrev: u8,
    pub int_size: usize,
    pub offset_size: usize,
    pub format: u8,
    pub compression: CompressionMethod,
    pub timestamp: NaiveDateTime,
    pub dbname: String,
    pub server_version: String,
    pub dump_version: String,
}

impl Header {
    pub fn version_tuple(&self) -> (u8, u8, u8) {
        (self.vmaj, self.vmin, self.vrev)
    }

    pub fn dio(&self) -> DumpIO {
        DumpIO::new(self.int_size, self.offset_size)
    }

    pub fn is_version_at_least_1_14(&self) -> bool {
        (self.vmaj, self.vmin, self.vrev) >= (1, 14, 0)
    }
}

/// Map a Postgres server version to the archive-format version this engine
/// will declare when authoring a fresh archive ("appear as" that server).
pub fn appear_as_to_version(appear_as: &str) -> Result<(u8, u8, u8)> {
    let major: f64 = appear_as
        .split('.')
        .take(2)
        .collect::<Vec<_>>()
        .join(".")
        .parse()
        .map_err(|_| PgArchiveError::UnsupportedPostgresVersion(appear_as.to_string()))?;

    if major >= 12.0 {
        Ok((1, 14, 0))
    } else if major >= 10.3 {
        Ok((1, 13, 0))
    } else if major >= 9.0 {
        Ok((1, 12, 0))
    } else {
        Err(PgArchiveError::UnsupportedPostgresVersion(appear_as.to_string()))
    }
}

/// Parse the header. Archives in `[MIN_VER, MAX_VER]` always encode
/// compression as a legacy zlib level int (0 = none, -1 = default zlib,
/// 1..=9 = zlib at that level); the per-byte compression-algorithm field
/// introduced in 1.15 is out of range for this engine.
pub fn parse_header<R: Read>(reader: &mut R) -> Result<Header> {
    let magic = DumpIO::read_exact(reader, MAGIC_HEADER.len())?;
    if magic.as_slice() != MAGIC_HEADER.as_slice() {
        return Err(PgArchiveError::BadMagic);
    }

    let vmaj = DumpIO::read_byte(reader)?;
    let vmin = DumpIO::read_byte(reader)?;
    let vrev = DumpIO::read_byte(reader)?;

    if (vmaj, vmin, vrev) < MIN_VER || (vmaj, vmin, vrev) > MAX_VER {
        return Err(PgArchiveError::UnsupportedVersion(vmaj, vmin, vrev));
    }

    let int_size = DumpIO::read_byte(reader)? as usize;
    let offset_size = DumpIO::read_byte(reader)? as usize;
    if int_size == 0 || int_size > 8 || offset_size == 0 || offset_size > 8 {
        return Err(PgArchiveError::InvalidFormat(format!(
            "invalid int_size={int_size} or offset_size={offset_size}"
        )));
    }

    let format = DumpIO::read_byte(reader)?;
    if format != 1 {
        return Err(PgArchiveError::InvalidFormat(format!(
            "expected custom format (1), got {format}"
        )));
    }

    let dio = DumpIO::new(int_size, offset_size);

    let level = dio.read_int(reader)?;
    let compression = match level {
        0 => CompressionMethod::None,
        -1 => CompressionMethod::Zlib,
        1..=9 => CompressionMethod::Zlib,
        other => {
            return Err(PgArchiveError::UnsupportedCompression(format!(
                "invalid legacy compression level {other}"
            )))
        }
    };

    // sec, min, hour, mday, mon (0-based), year (since 1900), isdst. isdst
    // is read to stay byte-aligned with the source and then discarded; we
    // have no reliable way to reconstruct it (same limitation the original
    // Python implementation notes).
    let sec = dio.read_int(reader)?;
    let min = dio.read_int(reader)?;
    let hour = dio.read_int(reader)?;
    let mday = dio.read_int(reader)?;
    let mon = dio.read_int(reader)?;
    let year = dio.read_int(reader)?;
    let _isdst = dio.read_int(reader)?;

    let timestamp = chrono::NaiveDate::from_ymd_opt((year + 1900) as i32, (mon + 1) as u32, mday as u32)
        .and_then(|d| d.and_hms_opt(hour as u32, min as u32, sec as u32))
        .ok_or_else(|| PgArchiveError::CorruptArchive("invalid header timestamp".to_string()))?;

    let dbname = dio.read_string(reader)?;
    let server_version = dio.read_string(reader)?;
    let dump_version = dio.read_string(reader)?;

    #[cfg(debug_assertions)]
    eprintln!(
        "pgarchive: parsed header v{vmaj}.{vmin}.{vrev} int_size={int_size} offset_size={offset_size} \
         compression={compression:?} dbname={dbname:?}"
    );

    Ok(Header {
        vmaj,
        vmin,
        vrev,
        int_size,
        offset_size,
        format,
        compression,
        timestamp,
        dbname,
        server_version,
        dump_version,
    })
}

pub fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<()> {
    writer.write_all(MAGIC_HEADER)?;
    writer.write_all(&[header.vmaj, header.vmin, header.vrev])?;
    writer.write_all(&[header.int_size as u8, header.offset_size as u8])?;
    writer.write_all(&[header.format])?;

    let dio = header.dio();

    // This engine's writer always emits uncompressed output (see
    // DESIGN.md); legacy compression-level field is written as 0
    // regardless of the header's declared compression.
    dio.write_int(writer, 0)?;

    use chrono::{Datelike, Timelike};
    let ts = &header.timestamp;
    dio.write_int(writer, ts.second() as i64)?;
    dio.write_int(writer, ts.minute() as i64)?;
    dio.write_int(writer, ts.hour() as i64)?;
    dio.write_int(writer, ts.day() as i64)?;
    dio.write_int(writer, ts.month0() as i64)?;
    dio.write_int(writer, ts.year() as i64 - 1900)?;
    dio.write_int(writer, 0)?; // isdst, always unknown

    dio.write_string(writer, &header.dbname)?;
    dio.write_string(writer, &header.server_version)?;
    dio.write_string(writer, &header.dump_version)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header() -> Header {
        Header {
            vmaj: 1,
            vmin: 14,
            vrev: 0,
            int_size: 4,
            offset_size: 8,
            format: 1,
            compression: CompressionMethod::None,
            timestamp: chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(12, 30, 5)
                .unwrap(),
            dbname: "widgets".to_string(),
            server_version: "14.10".to_string(),
            dump_version: "14.10".to_string(),
        }
    }

    #[test]
    fn header_roundtrip() {
        let header = sample_header();
        let mut buf = Vec::new();
        write_header(&mut buf, &header).unwrap();
        let mut cur = Cursor::new(buf);
        let parsed = parse_header(&mut cur).unwrap();
        assert_eq!(parsed.version_tuple(), (1, 14, 0));
        assert_eq!(parsed.int_size, 4);
        assert_eq!(parsed.offset_size, 8);
        assert_eq!(parsed.compression, CompressionMethod::None);
        assert_eq!(parsed.dbname, "widgets");
        assert_eq!(parsed.server_version, "14.10");
        assert_eq!(parsed.timestamp, header.timestamp);
    }

    #[test]
    fn bad_magic_rejected() {
        let mut cur = Cursor::new(b"NOTAMAGIC!!".to_vec());
        assert!(matches!(parse_header(&mut cur), Err(PgArchiveError::BadMagic)));
    }

    #[test]
    fn out_of_range_version_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC_HEADER);
        buf.extend_from_slice(&[1, 16, 0, 4, 8, 1]);
        let mut cur = Cursor::new(buf);
        assert!(matches!(
            parse_header(&mut cur),
            Err(PgArchiveError::UnsupportedVersion(1, 16, 0))
        ));
    }

    #[test]
    fn appear_as_maps_known_versions() {
        assert_eq!(appear_as_to_version("12.4").unwrap(), (1, 14, 0));
        assert_eq!(appear_as_to_version("10.3").unwrap(), (1, 13, 0));
        assert_eq!(appear_as_to_version("9.6").unwrap(), (1, 12, 0));
        assert!(appear_as_to_version("8.4").is_err());
    }
}
