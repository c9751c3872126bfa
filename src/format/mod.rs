pub mod custom;

/// PGDMP magic bytes that open every custom-format archive.
pub const MAGIC_HEADER: &[u8; 5] = b"PGDMP";
