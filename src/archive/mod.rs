pub mod entry;
pub mod reader;
pub mod spill;
pub mod writer;

use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter, Read, Write};
use std::rc::Rc;

use flate2::write::GzEncoder;

use crate::convert::{split_copy_line, RowConverter};
use crate::error::{PgArchiveError, Result};
use crate::format::custom::constants::is_known_descriptor;
use crate::format::custom::header::{appear_as_to_version, parse_header, CompressionMethod, Header};

pub use entry::{DataState, Entry, Section};
pub use spill::SpillStore;

/// A loaded or freshly-authored pg_dump custom-format archive: table of
/// contents plus the spill store backing its table/blob data.
pub struct Archive {
    pub header: Header,
    pub dbname: String,
    pub encoding: String,
    entries: Vec<Entry>,
    spill: SpillStore,
    /// Keyed by the owning `TABLE` entry's dump id, so repeat
    /// `table_data_writer` calls for the same table return the same handle
    /// instead of appending a second `TABLE DATA` entry. Value is the
    /// `TABLE DATA` entry's own dump id plus the shared write handle.
    writers: std::collections::HashMap<i32, (i32, TableDataWriter)>,
}

impl Archive {
    /// Start a fresh, empty archive with the three bootstrap entries
    /// pg_dump always emits (`ENCODING`, `STDSTRINGS`, `SEARCHPATH`).
    pub fn new(dbname: impl Into<String>, encoding: impl Into<String>, appear_as: &str) -> Result<Self> {
        let (vmaj, vmin, vrev) = appear_as_to_version(appear_as)?;
        let dbname = dbname.into();
        let encoding = encoding.into();

        let header = Header {
            vmaj,
            vmin,
            vrev,
            int_size: 4,
            offset_size: 8,
            format: 1,
            compression: CompressionMethod::None,
            timestamp: chrono::Local::now().naive_local(),
            dbname: dbname.clone(),
            server_version: format!("{appear_as}.0"),
            dump_version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let mut encoding_entry = Entry::new(1, "ENCODING", "ENCODING");
        encoding_entry.defn = format!("SET client_encoding = '{encoding}';");
        let mut stdstrings_entry = Entry::new(2, "STDSTRINGS", "STDSTRINGS");
        stdstrings_entry.defn = "SET standard_conforming_strings = 'on';".to_string();
        let mut searchpath_entry = Entry::new(3, "SEARCHPATH", "SEARCHPATH");
        searchpath_entry.defn = "SELECT pg_catalog.set_config('search_path', '', false);".to_string();

        Ok(Self {
            header,
            dbname,
            encoding,
            entries: vec![encoding_entry, stdstrings_entry, searchpath_entry],
            spill: SpillStore::new_temp()?,
            writers: std::collections::HashMap::new(),
        })
    }

    /// Load an existing archive, decoding all table/blob data into the
    /// spill store up front.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PgArchiveError::PathMissing(path.display().to_string()));
        }

        let file = std::fs::File::open(path)?;
        let mut reader = BufReader::with_capacity(64 * 1024, file);

        let header = parse_header(&mut reader)?;
        let mut entries = reader::parse_entries(&mut reader, &header)?;
        let spill = SpillStore::new_temp()?;
        reader::load_data_into_spill(&mut reader, &header, &mut entries, &spill)?;

        let encoding = reader::derive_encoding(&entries).unwrap_or_else(|| "UTF8".to_string());
        let dbname = header.dbname.clone();

        Ok(Self {
            header,
            dbname,
            encoding,
            entries,
            spill,
            writers: std::collections::HashMap::new(),
        })
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get_entry(&self, dump_id: i32) -> Option<&Entry> {
        self.entries.iter().find(|e| e.dump_id == dump_id)
    }

    pub fn lookup_entry(&self, desc: &str, namespace: &str, tag: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.desc == desc && e.namespace == namespace && e.tag == tag)
    }

    /// Add a new ToC entry. `dump_id` is auto-assigned (one past the
    /// current maximum) unless given. `desc` must be a known descriptor and
    /// every dependency must already exist.
    #[allow(clippy::too_many_arguments)]
    pub fn add_entry(
        &mut self,
        desc: &str,
        tag: &str,
        namespace: &str,
        defn: &str,
        drop_stmt: &str,
        copy_stmt: &str,
        owner: &str,
        dependencies: Vec<i32>,
    ) -> Result<i32> {
        if !is_known_descriptor(desc) {
            return Err(PgArchiveError::InvalidDescriptor(desc.to_string()));
        }
        for dep in &dependencies {
            if self.get_entry(*dep).is_none() {
                return Err(PgArchiveError::UnknownDependency(*dep));
            }
        }

        let dump_id = self.entries.iter().map(|e| e.dump_id).max().unwrap_or(0) + 1;
        let mut entry = Entry::new(dump_id, desc, tag);
        entry.namespace = namespace.to_string();
        entry.defn = defn.to_string();
        entry.drop_stmt = drop_stmt.to_string();
        entry.copy_stmt = copy_stmt.to_string();
        entry.owner = owner.to_string();
        entry.dependencies = dependencies;
        if entry.has_data() {
            entry.data_state = DataState::NoData;
        }

        self.entries.push(entry);
        Ok(dump_id)
    }

    /// Read back and convert all rows for a `TABLE DATA` entry.
    pub fn table_data<C: RowConverter>(
        &self,
        namespace: &str,
        tag: &str,
        converter: &C,
    ) -> Result<Vec<C::Output>> {
        let entry = self
            .lookup_entry("TABLE DATA", namespace, tag)
            .ok_or_else(|| PgArchiveError::EntityNotFound(namespace.to_string(), tag.to_string()))?;

        if entry.data_state == DataState::NoData {
            return Ok(Vec::new());
        }

        let raw = self.spill.read_all(entry.dump_id)?;
        let text = String::from_utf8_lossy(&raw);
        let mut rows = Vec::new();
        for line in text.split('\n') {
            if line.is_empty() || line == "\\." {
                break;
            }
            let fields = split_copy_line(line.as_bytes());
            rows.push(converter.convert(&fields));
        }
        Ok(rows)
    }

    /// Return every blob's oid and raw bytes.
    pub fn blobs(&self) -> Result<Vec<(u32, Vec<u8>)>> {
        let mut out = Vec::new();
        for entry in self.entries.iter().filter(|e| e.desc == "BLOBS") {
            if entry.data_state == DataState::NoData {
                continue;
            }
            let raw = self.spill.read_all(entry.dump_id)?;
            let mut pos = 0;
            while pos < raw.len() {
                let oid = u32::from_le_bytes(raw[pos..pos + 4].try_into().unwrap());
                pos += 4;
                let len = u64::from_le_bytes(raw[pos..pos + 8].try_into().unwrap()) as usize;
                pos += 8;
                out.push((oid, raw[pos..pos + len].to_vec()));
                pos += len;
            }
        }
        Ok(out)
    }

    /// Acquire the append handle for a `TABLE` entry's row data. On first
    /// acquisition this appends a new `TABLE DATA` entry (with a `copy_stmt`
    /// derived from `columns` and `dependencies = [table_dump_id]`) and opens
    /// a fresh spill writer; subsequent calls for the same table entry
    /// return the same handle so appends accumulate into one stream.
    pub fn table_data_writer(&mut self, table_dump_id: i32, columns: &[&str]) -> Result<TableDataWriter> {
        if let Some((_, existing)) = self.writers.get(&table_dump_id) {
            return Ok(existing.clone());
        }

        let table = self
            .get_entry(table_dump_id)
            .ok_or(PgArchiveError::InvalidDumpId(table_dump_id))?;
        if table.desc != "TABLE" {
            return Err(PgArchiveError::InvalidDescriptor(table.desc.clone()));
        }
        let namespace = table.namespace.clone();
        let tag = table.tag.clone();

        let copy_stmt = format!("COPY {namespace}.{tag} ({}) FROM stdin;", columns.join(", "));
        let data_dump_id = self.add_entry(
            "TABLE DATA",
            &tag,
            &namespace,
            "",
            "",
            &copy_stmt,
            "",
            vec![table_dump_id],
        )?;

        let encoder = self.spill.create_writer(data_dump_id)?;
        let handle = TableDataWriter {
            inner: Rc::new(RefCell::new(encoder)),
        };
        self.writers.insert(table_dump_id, (data_dump_id, handle.clone()));
        Ok(handle)
    }

    /// Add raw bytes (a caller-supplied blob) under a fresh oid, storing it
    /// in the given `BLOBS` entry's spill file.
    pub fn add_blob(&mut self, blobs_dump_id: i32, oid: u32, data: &[u8]) -> Result<()> {
        let entry = self
            .get_entry(blobs_dump_id)
            .ok_or(PgArchiveError::InvalidDumpId(blobs_dump_id))?;
        if entry.desc != "BLOBS" {
            return Err(PgArchiveError::InvalidDescriptor(entry.desc.clone()));
        }

        let mut framed = self.spill.read_all(blobs_dump_id)?;
        framed.extend_from_slice(&oid.to_le_bytes());
        framed.extend_from_slice(&(data.len() as u64).to_le_bytes());
        framed.extend_from_slice(data);
        self.spill.write_all(blobs_dump_id, &framed)?;

        if let Some(e) = self.entries.iter_mut().find(|e| e.dump_id == blobs_dump_id) {
            e.data_state = DataState::PosNotSet;
        }
        Ok(())
    }

    /// Finish all open table-data writers and write the archive to `path`.
    pub fn save(&mut self, path: impl AsRef<std::path::Path>) -> Result<()> {
        for (_, (dump_id, handle)) in self.writers.drain() {
            if let Ok(inner) = Rc::try_unwrap(handle.inner) {
                inner.into_inner().finish()?.flush()?;
            }
            if let Some(e) = self.entries.iter_mut().find(|e| e.dump_id == dump_id) {
                if e.data_state == DataState::NoData && self.spill.has(dump_id) {
                    e.data_state = DataState::PosNotSet;
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)?;
        let mut file = BufWriteSeek::new(file);
        writer::save(&mut file, &self.header, &mut self.entries, &self.spill)?;
        file.flush()
    }
}

/// A shared handle for appending COPY-text rows to one table's data. Clones
/// share the same open gzip-compressed spill file, so repeated
/// `Archive::table_data_writer` calls for the same entry write to the same
/// stream instead of truncating it.
#[derive(Clone)]
pub struct TableDataWriter {
    inner: Rc<RefCell<GzEncoder<BufWriter<std::fs::File>>>>,
}

impl TableDataWriter {
    /// Append one row, tab-joining already-escaped column values and
    /// terminating with a newline, matching pg_dump's COPY-text output.
    pub fn append_row(&self, fields: &[&str]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                inner.write_all(b"\t")?;
            }
            inner.write_all(field.as_bytes())?;
        }
        inner.write_all(b"\n")?;
        Ok(())
    }
}

/// Thin `Seek`-capable wrapper so `writer::save` can work against a plain
/// `File` without each call site re-deriving the trait bounds.
struct BufWriteSeek {
    file: std::fs::File,
}

impl BufWriteSeek {
    fn new(file: std::fs::File) -> Self {
        Self { file }
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

impl std::io::Write for BufWriteSeek {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl std::io::Read for BufWriteSeek {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl std::io::Seek for BufWriteSeek {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        self.file.seek(pos)
    }
}
