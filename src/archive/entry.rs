use crate::error::{PgArchiveError, Result};
use crate::format::custom::constants::section_for_desc;

/// Which pass of a restore an entry belongs to. Computed from `desc`, never
/// stored independently — `Entry::section` derives it on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    None,
    PreData,
    Data,
    PostData,
}

impl Section {
    /// Wire encoding pg_restore expects: None=1, PreData=2, Data=3, PostData=4.
    pub fn wire_value(self) -> i64 {
        match self {
            Section::None => 1,
            Section::PreData => 2,
            Section::Data => 3,
            Section::PostData => 4,
        }
    }
}

impl TryFrom<i64> for Section {
    type Error = PgArchiveError;

    fn try_from(val: i64) -> Result<Self> {
        match val {
            1 => Ok(Section::None),
            2 => Ok(Section::PreData),
            3 => Ok(Section::Data),
            4 => Ok(Section::PostData),
            other => Err(PgArchiveError::InvalidFormat(format!(
                "unknown section wire value {other}"
            ))),
        }
    }
}

/// Whether, and how, an entry's data offset has been located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataState {
    /// Offset is known and points at the exact data block.
    PosSet,
    /// Entry has data but the offset hasn't been resolved (legacy
    /// archives written by `pg_dump` without `--file`-seekable output);
    /// the reader must scan forward to find it.
    PosNotSet,
    /// Entry has no data section at all.
    NoData,
}

impl DataState {
    pub fn wire_value(self) -> u8 {
        match self {
            DataState::PosNotSet => 1,
            DataState::PosSet => 2,
            DataState::NoData => 3,
        }
    }
}

impl TryFrom<u8> for DataState {
    type Error = PgArchiveError;

    fn try_from(val: u8) -> Result<Self> {
        match val {
            1 => Ok(DataState::PosNotSet),
            2 => Ok(DataState::PosSet),
            3 => Ok(DataState::NoData),
            other => Err(PgArchiveError::InvalidFormat(format!(
                "unknown data_state wire value {other}"
            ))),
        }
    }
}

/// A single table-of-contents entry: one object pg_restore can emit DDL or
/// data for. `section` is always derived from `desc`; it is never read off
/// the wire as authoritative, since the two can legitimately disagree on
/// archives hand-edited by other tools.
#[derive(Debug, Clone)]
pub struct Entry {
    pub dump_id: i32,
    pub had_dumper: bool,
    pub table_oid: String,
    pub oid: String,
    pub tag: String,
    pub desc: String,
    pub defn: String,
    pub drop_stmt: String,
    pub copy_stmt: String,
    pub namespace: String,
    pub tablespace: String,
    pub tableam: String,
    pub owner: String,
    pub with_oids: bool,
    pub dependencies: Vec<i32>,
    pub data_state: DataState,
    pub offset: u64,
}

impl Entry {
    pub fn new(dump_id: i32, desc: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            dump_id,
            had_dumper: false,
            table_oid: "0".to_string(),
            oid: "0".to_string(),
            tag: tag.into(),
            desc: desc.into(),
            defn: String::new(),
            drop_stmt: String::new(),
            copy_stmt: String::new(),
            namespace: String::new(),
            tablespace: String::new(),
            tableam: String::new(),
            owner: String::new(),
            with_oids: false,
            dependencies: Vec::new(),
            data_state: DataState::NoData,
            offset: 0,
        }
    }

    /// The section this entry belongs to, derived from `desc`. Panics only
    /// if `desc` is unknown, which the authoring API prevents by construction.
    pub fn section(&self) -> Section {
        section_for_desc(&self.desc).unwrap_or(Section::None)
    }

    pub fn has_data(&self) -> bool {
        matches!(self.desc.as_str(), "TABLE DATA" | "BLOBS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_wire_roundtrip() {
        for s in [Section::None, Section::PreData, Section::Data, Section::PostData] {
            assert_eq!(Section::try_from(s.wire_value()).unwrap(), s);
        }
    }

    #[test]
    fn data_state_wire_roundtrip() {
        for s in [DataState::PosNotSet, DataState::PosSet, DataState::NoData] {
            assert_eq!(DataState::try_from(s.wire_value()).unwrap(), s);
        }
    }

    #[test]
    fn section_derived_from_desc() {
        let e = Entry::new(1, "TABLE DATA", "public.widgets");
        assert_eq!(e.section(), Section::Data);
        assert!(e.has_data());

        let e2 = Entry::new(2, "TABLE", "public.widgets");
        assert_eq!(e2.section(), Section::PreData);
        assert!(!e2.has_data());
    }
}
