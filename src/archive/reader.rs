use std::io::Read;

use crate::archive::entry::{DataState, Entry, Section};
use crate::archive::spill::SpillStore;
use crate::compressor::{read_uncompressed_stream, Compressor, ZlibCompressor};
use crate::error::{PgArchiveError, Result};
use crate::format::custom::constants::{BLK_BLOBS, BLK_DATA};
use crate::format::custom::header::{CompressionMethod, Header};
use crate::format::custom::io::DumpIO;

/// Parse every table-of-contents entry following the header.
pub fn parse_entries<R: Read>(reader: &mut R, header: &Header) -> Result<Vec<Entry>> {
    let dio = header.dio();
    let count = dio.read_int(reader)?;
    let mut entries = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        entries.push(parse_entry(reader, &dio, header)?);
    }
    Ok(entries)
}

fn parse_entry<R: Read>(reader: &mut R, dio: &DumpIO, header: &Header) -> Result<Entry> {
    let dump_id = dio.read_int(reader)? as i32;
    let had_dumper = dio.read_int(reader)? != 0;
    let table_oid = dio.read_string(reader)?;
    let oid = dio.read_string(reader)?;
    let tag = dio.read_string(reader)?;
    let desc = dio.read_string(reader)?;
    let section_raw = dio.read_int(reader)?;
    Section::try_from(section_raw)?;
    let defn = dio.read_string(reader)?;
    let drop_stmt = dio.read_string(reader)?;
    let copy_stmt = dio.read_string(reader)?;
    let namespace = dio.read_string(reader)?;
    let tablespace = dio.read_string(reader)?;
    let tableam = if header.is_version_at_least_1_14() {
        dio.read_string(reader)?
    } else {
        String::new()
    };
    let owner = dio.read_string(reader)?;
    let with_oids = dio.read_string(reader)? == "true";

    let mut dependencies = Vec::new();
    loop {
        let raw = dio.read_bytes(reader)?;
        if raw.is_empty() {
            break;
        }
        let s = String::from_utf8_lossy(&raw);
        if let Ok(id) = s.parse::<i32>() {
            dependencies.push(id);
        }
    }

    let (data_state_byte, offset) = dio.read_offset(reader)?;
    let data_state = DataState::try_from(data_state_byte)?;

    Ok(Entry {
        dump_id,
        had_dumper,
        table_oid,
        oid,
        tag,
        desc,
        defn,
        drop_stmt,
        copy_stmt,
        namespace,
        tablespace,
        tableam,
        owner,
        with_oids,
        dependencies,
        data_state,
        offset,
    })
}

/// Stream the data section following the table of contents, decoding each
/// `BLK_DATA`/`BLK_BLOBS` block into the spill store keyed by dump id. Reads
/// sequentially from the current file position rather than seeking by
/// `entry.offset` — the data section always immediately follows the ToC in
/// file order, which is what a freshly-produced archive's `PosNotSet`
/// entries require anyway, and it equally satisfies `PosSet` archives.
pub fn load_data_into_spill<R: Read>(
    reader: &mut R,
    header: &Header,
    entries: &mut [Entry],
    spill: &SpillStore,
) -> Result<()> {
    let dio = header.dio();
    let compressor = ZlibCompressor;

    loop {
        let mut tag = [0u8; 1];
        match reader.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        if tag[0] == 0x04 {
            break;
        }

        let dump_id = dio.read_int(reader)? as i32;

        match tag[0] {
            t if t == BLK_DATA => {
                let data = read_block(&dio, header.compression, &compressor, reader)?;
                spill.write_all(dump_id, &data)?;
                mark_pos_set(entries, dump_id);
            }
            t if t == BLK_BLOBS => {
                let mut framed = Vec::new();
                loop {
                    let oid = dio.read_int(reader)?;
                    if oid == 0 {
                        break;
                    }
                    let blob = read_block(&dio, header.compression, &compressor, reader)?;
                    framed.extend_from_slice(&(oid as u32).to_le_bytes());
                    framed.extend_from_slice(&(blob.len() as u64).to_le_bytes());
                    framed.extend_from_slice(&blob);
                }
                spill.write_all(dump_id, &framed)?;
                mark_pos_set(entries, dump_id);
            }
            other => {
                return Err(PgArchiveError::CorruptArchive(format!(
                    "unknown data block tag {other:#x}"
                )))
            }
        }
    }

    // Anything not covered by a data block but carrying the `TABLE DATA`/
    // `BLOBS` descriptor had no rows at all.
    for entry in entries.iter_mut() {
        if entry.has_data() && entry.data_state != DataState::PosSet {
            entry.data_state = DataState::NoData;
        }
    }

    Ok(())
}

fn mark_pos_set(entries: &mut [Entry], dump_id: i32) {
    if let Some(e) = entries.iter_mut().find(|e| e.dump_id == dump_id) {
        e.data_state = DataState::PosSet;
    }
}

fn read_block<R: Read>(
    dio: &DumpIO,
    compression: CompressionMethod,
    compressor: &impl Compressor,
    reader: &mut R,
) -> Result<Vec<u8>> {
    match compression {
        CompressionMethod::None => read_uncompressed_stream(dio, reader),
        CompressionMethod::Zlib => compressor.decompress_stream(dio, reader),
    }
}

/// Re-derive the declared encoding from the `ENCODING` bootstrap entry's
/// definition (`SET client_encoding = '...';`), matching what a real
/// archive's ToC always carries independent of what the caller constructed
/// the in-memory archive with.
pub fn derive_encoding(entries: &[Entry]) -> Option<String> {
    let re = regex::Regex::new(r"=\s*'([^']*)'").ok()?;
    entries
        .iter()
        .find(|e| e.desc == "ENCODING")
        .and_then(|e| re.captures(&e.defn))
        .map(|c| c[1].to_string())
}
