//! Wire-level constants and the object-descriptor taxonomy for the custom
//! archive format.

/// Minimum and maximum archive-format version this engine will load.
pub const MIN_VER: (u8, u8, u8) = (1, 12, 0);
pub const MAX_VER: (u8, u8, u8) = (1, 14, 0);

/// Byte tag that precedes a table-data block in the data region.
pub const BLK_DATA: u8 = 0x01;
/// Byte tag that precedes a large-object (blob) group in the data region.
pub const BLK_BLOBS: u8 = 0x03;

/// Threshold below which a compressed chunk size signals end-of-stream.
pub const ZLIB_IN_SIZE: i32 = 4096;

pub const ENCODING: &str = "ENCODING";
pub const STDSTRINGS: &str = "STDSTRINGS";
pub const SEARCHPATH: &str = "SEARCHPATH";
pub const TABLE_DATA: &str = "TABLE DATA";
pub const BLOBS: &str = "BLOBS";

/// Fixed order in which the three bootstrap entries are always emitted.
pub const BOOTSTRAP_ORDER: [&str; 3] = [ENCODING, STDSTRINGS, SEARCHPATH];

/// Stable total order for Pre-Data entries that must be emitted ahead of
/// the rest of the section, left-to-right.
pub const PRE_DATA_PREFERRED: [&str; 13] = [
    "SCHEMA",
    "EXTENSION",
    "AGGREGATE",
    "OPERATOR",
    "CAST",
    "COLLATION",
    "CONVERSION",
    "PROCEDURAL LANGUAGE",
    "FOREIGN DATA WRAPPER",
    "SERVER",
    "DOMAIN",
    "TYPE",
    "SHELL TYPE",
];

/// Stable total order for Post-Data entries that must be emitted ahead of
/// the rest of the section, left-to-right.
pub const POST_DATA_PREFERRED: [&str; 3] = ["CHECK CONSTRAINT", "CONSTRAINT", "INDEX"];

/// Maps an entry's `desc` to its section. `desc` values not present here
/// are unknown descriptors and rejected by the authoring API.
pub fn section_for_desc(desc: &str) -> Option<crate::archive::entry::Section> {
    use crate::archive::entry::Section;

    Some(match desc {
        "COMMENT" | "ACL" | "DEFAULT ACL" | "SECURITY LABEL" => Section::None,

        "ENCODING" | "STDSTRINGS" | "SEARCHPATH" | "DATABASE" | "SCHEMA" | "EXTENSION"
        | "TYPE" | "SHELL TYPE" | "DOMAIN" | "FUNCTION" | "PROCEDURE" | "AGGREGATE"
        | "OPERATOR" | "OPERATOR CLASS" | "OPERATOR FAMILY" | "CAST" | "COLLATION"
        | "CONVERSION" | "PROCEDURAL LANGUAGE" | "FOREIGN DATA WRAPPER" | "SERVER"
        | "USER MAPPING" | "TABLE" | "SEQUENCE" | "VIEW" | "MATERIALIZED VIEW"
        | "FOREIGN TABLE" | "TABLESPACE" => Section::PreData,

        "TABLE DATA" | "BLOBS" => Section::Data,

        "INDEX" | "CONSTRAINT" | "CHECK CONSTRAINT" | "FK CONSTRAINT" | "TRIGGER" | "RULE"
        | "SEQUENCE SET" | "MATERIALIZED VIEW DATA" | "PUBLICATION" | "PUBLICATION TABLE"
        | "SUBSCRIPTION" | "DEFAULT" => Section::PostData,

        _ => return None,
    })
}

/// All known descriptors, for validation and documentation purposes.
pub fn is_known_descriptor(desc: &str) -> bool {
    section_for_desc(desc).is_some()
}
