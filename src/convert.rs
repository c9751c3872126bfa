use std::net::IpAddr;
use std::str::FromStr;

use chrono::NaiveDateTime;
use ipnet::IpNet;
use rust_decimal::Decimal;
use uuid::Uuid;

/// A single COPY-text column after conversion by `SmartConverter`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Decimal(Decimal),
    String(String),
    Ip(IpAddr),
    IpNet(IpNet),
    Uuid(Uuid),
    Timestamp(NaiveDateTime),
}

/// Converts one COPY-text row (already split into raw tab-delimited byte
/// fields by the caller) into whatever shape the caller wants.
pub trait RowConverter {
    type Output;

    fn convert(&self, raw_fields: &[Vec<u8>]) -> Self::Output;
}

/// Performs no conversion at all; returns the raw fields unmodified,
/// `\N` markers and all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpConverter;

impl RowConverter for NoOpConverter {
    type Output = Vec<Vec<u8>>;

    fn convert(&self, raw_fields: &[Vec<u8>]) -> Self::Output {
        raw_fields.to_vec()
    }
}

/// Unescapes COPY-text bytes and turns `\N` into `None`; everything else
/// stays a string.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConverter;

impl RowConverter for DefaultConverter {
    type Output = Vec<Option<Vec<u8>>>;

    fn convert(&self, raw_fields: &[Vec<u8>]) -> Self::Output {
        raw_fields
            .iter()
            .map(|f| {
                if f.as_slice() == b"\\N" {
                    None
                } else {
                    Some(unescape_copy_text(f))
                }
            })
            .collect()
    }
}

/// Unescapes each field and attempts to parse it into a native type,
/// trying int, decimal, IP address, IP network, UUID, and timestamp in
/// that order before falling back to a plain string.
#[derive(Debug, Default, Clone, Copy)]
pub struct SmartConverter;

impl RowConverter for SmartConverter {
    type Output = Vec<Cell>;

    fn convert(&self, raw_fields: &[Vec<u8>]) -> Self::Output {
        raw_fields.iter().map(|f| Self::convert_column(f)).collect()
    }
}

impl SmartConverter {
    fn convert_column(raw: &[u8]) -> Cell {
        if raw == b"\\N" {
            return Cell::Null;
        }

        let unescaped = unescape_copy_text(raw);
        let text = match std::str::from_utf8(&unescaped) {
            Ok(s) => s,
            Err(_) => return Cell::String(String::from_utf8_lossy(&unescaped).into_owned()),
        };

        if let Ok(i) = text.parse::<i64>() {
            return Cell::Int(i);
        }
        if let Ok(d) = Decimal::from_str(text) {
            return Cell::Decimal(d);
        }
        if let Ok(ip) = text.parse::<IpAddr>() {
            return Cell::Ip(ip);
        }
        if let Ok(net) = text.parse::<IpNet>() {
            return Cell::IpNet(net);
        }
        if let Ok(uuid) = Uuid::parse_str(text) {
            return Cell::Uuid(uuid);
        }
        for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(ts) = NaiveDateTime::parse_from_str(text, fmt) {
                return Cell::Timestamp(ts);
            }
        }

        Cell::String(text.to_string())
    }
}

/// Splits a raw COPY-text line on unescaped tabs into its column fields,
/// leaving each field's escape sequences untouched (converters unescape
/// per-field after the NULL check).
pub fn split_copy_line(line: &[u8]) -> Vec<Vec<u8>> {
    let mut fields = Vec::new();
    let mut current = Vec::new();
    let mut i = 0;
    while i < line.len() {
        match line[i] {
            b'\\' if i + 1 < line.len() => {
                current.push(line[i]);
                current.push(line[i + 1]);
                i += 2;
            }
            b'\t' => {
                fields.push(std::mem::take(&mut current));
                i += 1;
            }
            b => {
                current.push(b);
                i += 1;
            }
        }
    }
    fields.push(current);
    fields
}

/// Reverses the PostgreSQL COPY-text escape grammar on a single field:
/// named control escapes (`\b \f \n \r \t \v`), `\\`, octal `\NNN` (1-3
/// octal digits), hex `\xNN` (1-2 hex digits, matched greedily), a literal
/// backslash followed by any other byte passes the byte through unescaped,
/// and a trailing lone backslash is preserved as-is.
pub fn unescape_copy_text(field: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(field.len());
    let mut i = 0;
    while i < field.len() {
        if field[i] != b'\\' {
            out.push(field[i]);
            i += 1;
            continue;
        }

        // Lone trailing backslash: preserve as-is.
        if i + 1 >= field.len() {
            out.push(b'\\');
            i += 1;
            continue;
        }

        let next = field[i + 1];
        match next {
            b'b' => {
                out.push(0x08);
                i += 2;
            }
            b'f' => {
                out.push(0x0C);
                i += 2;
            }
            b'n' => {
                out.push(b'\n');
                i += 2;
            }
            b'r' => {
                out.push(b'\r');
                i += 2;
            }
            b't' => {
                out.push(b'\t');
                i += 2;
            }
            b'v' => {
                out.push(0x0B);
                i += 2;
            }
            b'\\' => {
                out.push(b'\\');
                i += 2;
            }
            b'x' => {
                let mut j = i + 2;
                let mut digits = 0;
                while j < field.len() && digits < 2 && field[j].is_ascii_hexdigit() {
                    j += 1;
                    digits += 1;
                }
                if digits == 0 {
                    out.push(next);
                    i += 2;
                } else {
                    let hex = std::str::from_utf8(&field[i + 2..j]).unwrap();
                    out.push(u8::from_str_radix(hex, 16).unwrap());
                    i = j;
                }
            }
            b'0'..=b'7' => {
                let mut j = i + 1;
                let mut digits = 0;
                while j < field.len() && digits < 3 && (b'0'..=b'7').contains(&field[j]) {
                    j += 1;
                    digits += 1;
                }
                let oct = std::str::from_utf8(&field[i + 1..j]).unwrap();
                let value = u32::from_str_radix(oct, 8).unwrap_or(0);
                out.push(value as u8);
                i = j;
            }
            other => {
                // Unknown escape: the backslash is dropped, the byte passes through.
                out.push(other);
                i += 2;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescapes_named_controls() {
        assert_eq!(unescape_copy_text(b"a\\tb\\nc"), b"a\tb\nc");
    }

    #[test]
    fn unescapes_octal_and_hex() {
        assert_eq!(unescape_copy_text(b"\\101"), b"A");
        assert_eq!(unescape_copy_text(b"\\x41"), b"A");
        assert_eq!(unescape_copy_text(b"\\x4"), b"\x04");
    }

    #[test]
    fn unescapes_double_backslash_and_unknown() {
        assert_eq!(unescape_copy_text(b"a\\\\b"), b"a\\b");
        assert_eq!(unescape_copy_text(b"a\\qb"), b"aqb");
    }

    #[test]
    fn trailing_lone_backslash_preserved() {
        assert_eq!(unescape_copy_text(b"abc\\"), b"abc\\");
    }

    #[test]
    fn split_handles_escaped_tabs() {
        let fields = split_copy_line(b"a\\tb\tc\td");
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], b"a\\tb");
        assert_eq!(fields[1], b"c");
        assert_eq!(fields[2], b"d");
    }

    #[test]
    fn default_converter_detects_null() {
        let fields = vec![b"\\N".to_vec(), b"hello".to_vec()];
        let out = DefaultConverter.convert(&fields);
        assert_eq!(out[0], None);
        assert_eq!(out[1], Some(b"hello".to_vec()));
    }

    #[test]
    fn smart_converter_types_columns() {
        let fields = vec![
            b"42".to_vec(),
            b"3.14".to_vec(),
            b"192.168.1.1".to_vec(),
            b"\\N".to_vec(),
            b"plain".to_vec(),
        ];
        let out = SmartConverter.convert(&fields);
        assert_eq!(out[0], Cell::Int(42));
        assert!(matches!(out[1], Cell::Decimal(_)));
        assert!(matches!(out[2], Cell::Ip(_)));
        assert_eq!(out[3], Cell::Null);
        assert_eq!(out[4], Cell::String("plain".to_string()));
    }
}
