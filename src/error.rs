use thiserror::Error;

/// Errors produced while reading, authoring, or writing a custom-format
/// archive.
#[derive(Error, Debug)]
pub enum PgArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("path does not exist: {0}")]
    PathMissing(String),

    #[error("invalid PGDMP magic header")]
    BadMagic,

    #[error("unsupported archive version {0}.{1}.{2}")]
    UnsupportedVersion(u8, u8, u8),

    #[error("unsupported PostgreSQL version: {0}")]
    UnsupportedPostgresVersion(String),

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("invalid dump id: {0}")]
    InvalidDumpId(i32),

    #[error("unknown dependency dump id: {0}")]
    UnknownDependency(i32),

    #[error("did not find {0}.{1} in the table of contents")]
    EntityNotFound(String, String),

    #[error("no spill data for dump id {0}")]
    NoData(i32),

    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(String),

    #[error("invalid archive data: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, PgArchiveError>;
