use std::io::{Read, Write};

use crate::error::{PgArchiveError, Result};

/// Binary primitives for the custom dump format, parameterized by the
/// header's declared integer and offset width.
///
/// - Integers: 1 byte sign (0=positive, nonzero=negative) + `int_size`
///   little-endian magnitude bytes. `-1` is the dependency-list terminator.
/// - Strings: a signed int length followed by that many UTF-8 bytes.
/// - Offsets: 1 byte data-state + `offset_size` little-endian magnitude
///   bytes, unsigned, no sign byte.
#[derive(Debug, Clone, Copy)]
pub struct DumpIO {
    pub int_size: usize,
    pub offset_size: usize,
}

impl DumpIO {
    pub fn new(int_size: usize, offset_size: usize) -> Self {
        Self {
            int_size,
            offset_size,
        }
    }

    pub fn read_byte<R: Read>(reader: &mut R) -> Result<u8> {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Read a signed integer: 1 sign byte + `int_size` magnitude bytes.
    pub fn read_int<R: Read>(&self, reader: &mut R) -> Result<i64> {
        let sign = Self::read_byte(reader)?;

        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf[..self.int_size])?;

        let mut value: i64 = 0;
        let mut shift = 0;
        for &b in &buf[..self.int_size] {
            value |= (b as i64) << shift;
            shift += 8;
        }

        Ok(if sign != 0 { -value } else { value })
    }

    /// Write a signed integer in the same shape `read_int` expects.
    pub fn write_int<W: Write>(&self, writer: &mut W, val: i64) -> Result<()> {
        let (sign, magnitude) = if val < 0 {
            (1u8, val.wrapping_neg() as u64)
        } else {
            (0u8, val as u64)
        };

        let mut buf = [0u8; 9];
        buf[0] = sign;
        let mut current = magnitude;
        for i in 0..self.int_size {
            buf[1 + i] = (current & 0xFF) as u8;
            current >>= 8;
        }
        writer.write_all(&buf[..1 + self.int_size])?;
        Ok(())
    }

    /// Read a length-prefixed byte string. A length `<= 0` yields an empty
    /// vector (the format never emits negative lengths on write).
    pub fn read_bytes<R: Read>(&self, reader: &mut R) -> Result<Vec<u8>> {
        let len = self.read_int(reader)?;
        if len <= 0 {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Read a length-prefixed string, lossily decoding invalid UTF-8.
    pub fn read_string<R: Read>(&self, reader: &mut R) -> Result<String> {
        let bytes = self.read_bytes(reader)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn write_bytes<W: Write>(&self, writer: &mut W, value: &[u8]) -> Result<()> {
        self.write_int(writer, value.len() as i64)?;
        writer.write_all(value)?;
        Ok(())
    }

    pub fn write_string<W: Write>(&self, writer: &mut W, value: &str) -> Result<()> {
        self.write_bytes(writer, value.as_bytes())
    }

    /// Read the data-state byte plus an unsigned offset magnitude (no sign
    /// byte, unlike `read_int`).
    pub fn read_offset<R: Read>(&self, reader: &mut R) -> Result<(u8, u64)> {
        let data_state = Self::read_byte(reader)?;
        let mut value: u64 = 0;
        for i in 0..self.offset_size {
            let byte = Self::read_byte(reader)? as u64;
            value |= byte << (i * 8);
        }
        Ok((data_state, value))
    }

    pub fn write_offset<W: Write>(&self, writer: &mut W, data_state: u8, value: u64) -> Result<()> {
        writer.write_all(&[data_state])?;
        let mut current = value;
        for _ in 0..self.offset_size {
            writer.write_all(&[(current & 0xFF) as u8])?;
            current >>= 8;
        }
        Ok(())
    }

    pub fn read_exact<R: Read>(reader: &mut R, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        reader
            .read_exact(&mut buf)
            .map_err(|e| PgArchiveError::CorruptArchive(format!("short read of {n} bytes: {e}")))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip_int(dio: &DumpIO, value: i64) -> i64 {
        let mut buf = Vec::new();
        dio.write_int(&mut buf, value).unwrap();
        let mut cur = Cursor::new(buf);
        dio.read_int(&mut cur).unwrap()
    }

    #[test]
    fn int_roundtrip() {
        let dio = DumpIO::new(4, 8);
        for v in [0, 1, -1, 42, -42, i32::MAX as i64, -(i32::MAX as i64)] {
            assert_eq!(roundtrip_int(&dio, v), v);
        }
    }

    #[test]
    fn string_roundtrip() {
        let dio = DumpIO::new(4, 8);
        let mut buf = Vec::new();
        dio.write_string(&mut buf, "hello world").unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(dio.read_string(&mut cur).unwrap(), "hello world");
    }

    #[test]
    fn empty_string_roundtrip() {
        let dio = DumpIO::new(4, 8);
        let mut buf = Vec::new();
        dio.write_string(&mut buf, "").unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(dio.read_string(&mut cur).unwrap(), "");
    }

    #[test]
    fn offset_roundtrip() {
        let dio = DumpIO::new(4, 8);
        let mut buf = Vec::new();
        dio.write_offset(&mut buf, 2, 123_456_789).unwrap();
        let mut cur = Cursor::new(buf);
        assert_eq!(dio.read_offset(&mut cur).unwrap(), (2, 123_456_789));
    }
}
