use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::archive::entry::{DataState, Entry, Section};
use crate::archive::spill::SpillStore;
use crate::error::{PgArchiveError, Result};
use crate::format::custom::constants::{BOOTSTRAP_ORDER, POST_DATA_PREFERRED, PRE_DATA_PREFERRED};
use crate::format::custom::header::{write_header, Header};
use crate::format::custom::io::DumpIO;

/// Decide the order entries are written in: the three bootstrap entries
/// first (`ENCODING`, `STDSTRINGS`, `SEARCHPATH`, in that order), then each
/// section in turn (Pre-Data, Data, Post-Data, None); within a section the
/// preferred-descriptor list comes first (in list order), and everything
/// else follows in dependency order via a stable topological sort. `None`
/// comes last since its entries (`COMMENT`, `ACL`, ...) commonly depend on
/// objects from the earlier sections.
pub fn order_entries_for_write(entries: &[Entry]) -> Result<Vec<usize>> {
    let idx_of: HashMap<i32, usize> = entries.iter().enumerate().map(|(i, e)| (e.dump_id, i)).collect();

    let mut order = Vec::with_capacity(entries.len());
    let mut placed = vec![false; entries.len()];

    for &desc in BOOTSTRAP_ORDER.iter() {
        for (i, e) in entries.iter().enumerate() {
            if !placed[i] && e.desc == desc {
                order.push(i);
                placed[i] = true;
            }
        }
    }

    for section in [Section::PreData, Section::Data, Section::PostData, Section::None] {
        let bucket: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(i, e)| !placed[*i] && e.section() == section)
            .map(|(i, _)| i)
            .collect();

        let preferred: &[&str] = match section {
            Section::PreData => &PRE_DATA_PREFERRED,
            Section::PostData => &POST_DATA_PREFERRED,
            _ => &[],
        };

        let mut preferred_part = Vec::new();
        for &desc in preferred {
            for &i in &bucket {
                if entries[i].desc == desc && !preferred_part.contains(&i) {
                    preferred_part.push(i);
                }
            }
        }

        let rest: Vec<usize> = bucket
            .into_iter()
            .filter(|i| !preferred_part.contains(i))
            .collect();
        let topo = topo_sort(&rest, entries, &idx_of)?;

        for i in preferred_part {
            order.push(i);
            placed[i] = true;
        }
        for i in topo {
            order.push(i);
            placed[i] = true;
        }
    }

    Ok(order)
}

/// Kahn's algorithm restricted to `subset`, breaking ties by lowest
/// original index so the output is deterministic and, absent real
/// dependency constraints, matches append order.
fn topo_sort(subset: &[usize], entries: &[Entry], idx_of: &HashMap<i32, usize>) -> Result<Vec<usize>> {
    let set: std::collections::HashSet<usize> = subset.iter().copied().collect();
    let mut indegree: HashMap<usize, usize> = subset.iter().map(|&i| (i, 0)).collect();
    let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();

    for &i in subset {
        for dep_dump_id in &entries[i].dependencies {
            if let Some(&dep_idx) = idx_of.get(dep_dump_id) {
                if set.contains(&dep_idx) {
                    *indegree.get_mut(&i).unwrap() += 1;
                    dependents.entry(dep_idx).or_default().push(i);
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(subset.len());
    while let Some(&next) = ready.iter().next() {
        ready.remove(&next);
        order.push(next);
        if let Some(deps) = dependents.get(&next) {
            for &d in deps {
                let slot = indegree.get_mut(&d).unwrap();
                *slot -= 1;
                if *slot == 0 {
                    ready.insert(d);
                }
            }
        }
    }

    if order.len() != subset.len() {
        return Err(PgArchiveError::CorruptArchive(
            "dependency cycle detected while ordering entries for write".to_string(),
        ));
    }

    Ok(order)
}

fn write_entry<W: Write>(writer: &mut W, dio: &DumpIO, header: &Header, entry: &Entry) -> Result<()> {
    dio.write_int(writer, entry.dump_id as i64)?;
    dio.write_int(writer, entry.had_dumper as i64)?;
    dio.write_string(writer, &entry.table_oid)?;
    dio.write_string(writer, &entry.oid)?;
    dio.write_string(writer, &entry.tag)?;
    dio.write_string(writer, &entry.desc)?;
    dio.write_int(writer, entry.section().wire_value())?;
    dio.write_string(writer, &entry.defn)?;
    dio.write_string(writer, &entry.drop_stmt)?;
    dio.write_string(writer, &entry.copy_stmt)?;
    dio.write_string(writer, &entry.namespace)?;
    dio.write_string(writer, &entry.tablespace)?;
    if header.is_version_at_least_1_14() {
        dio.write_string(writer, &entry.tableam)?;
    }
    dio.write_string(writer, &entry.owner)?;
    dio.write_string(writer, if entry.with_oids { "true" } else { "false" })?;
    for dep in &entry.dependencies {
        dio.write_string(writer, &dep.to_string())?;
    }
    dio.write_int(writer, -1)?;
    dio.write_offset(writer, entry.data_state.wire_value(), entry.offset)?;
    Ok(())
}

fn write_toc<W: Write>(
    writer: &mut W,
    header: &Header,
    ordered: &[&Entry],
) -> Result<()> {
    write_header(writer, header)?;
    let dio = header.dio();
    dio.write_int(writer, ordered.len() as i64)?;
    for entry in ordered {
        write_entry(writer, &dio, header, entry)?;
    }
    Ok(())
}

/// Two-pass save: write a placeholder ToC (offsets not yet known), stream
/// the data blocks while recording each data entry's file offset and
/// promoting its `data_state` to `PosSet` (or `NoData` if the table/blob
/// turned out empty), then rewind and rewrite the ToC with the final
/// offsets. This engine always writes uncompressed data blocks regardless
/// of any compression recorded on a loaded archive (see DESIGN.md).
pub fn save<F: Write + Seek + Read>(
    file: &mut F,
    header: &Header,
    entries: &mut [Entry],
    spill: &SpillStore,
) -> Result<()> {
    let order = order_entries_for_write(entries)?;
    let dio = header.dio();

    let snapshot: Vec<Entry> = order.iter().map(|&i| entries[i].clone()).collect();
    write_toc(file, header, &snapshot.iter().collect::<Vec<_>>())?;

    for &i in &order {
        if entries[i].section() != Section::Data {
            continue;
        }

        let offset = file.stream_position()?;
        let dump_id = entries[i].dump_id;
        let data = spill.read_all(dump_id)?;

        if data.is_empty() {
            entries[i].data_state = DataState::NoData;
            entries[i].offset = 0;
            continue;
        }

        entries[i].offset = offset;
        entries[i].data_state = DataState::PosSet;

        if entries[i].desc == "TABLE DATA" {
            file.write_all(&[crate::format::custom::constants::BLK_DATA])?;
            dio.write_int(file, dump_id as i64)?;
            crate::compressor::write_uncompressed_stream(&dio, file, &data)?;
        } else if entries[i].desc == "BLOBS" {
            file.write_all(&[crate::format::custom::constants::BLK_BLOBS])?;
            dio.write_int(file, dump_id as i64)?;
            write_framed_blobs(&dio, file, &data)?;
        }
    }

    file.write_all(&[0x04])?;

    file.seek(SeekFrom::Start(0))?;
    let ordered_entries: Vec<&Entry> = order.iter().map(|&i| &entries[i]).collect();
    write_toc(file, header, &ordered_entries)?;

    Ok(())
}

/// Replay the spill store's internal `oid:u32 | len:u64 | bytes` framing as
/// the wire's chunked, per-blob data blocks.
fn write_framed_blobs<W: Write>(dio: &DumpIO, writer: &mut W, framed: &[u8]) -> Result<()> {
    let mut pos = 0;
    while pos < framed.len() {
        let oid = u32::from_le_bytes(framed[pos..pos + 4].try_into().unwrap());
        pos += 4;
        let len = u64::from_le_bytes(framed[pos..pos + 8].try_into().unwrap()) as usize;
        pos += 8;
        let blob = &framed[pos..pos + len];
        pos += len;

        dio.write_int(writer, oid as i64)?;
        crate::compressor::write_uncompressed_stream(dio, writer, blob)?;
    }
    dio.write_int(writer, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dump_id: i32, desc: &str, deps: Vec<i32>) -> Entry {
        let mut e = Entry::new(dump_id, desc, format!("obj{dump_id}"));
        e.dependencies = deps;
        e
    }

    #[test]
    fn bootstrap_entries_come_first() {
        let entries = vec![
            entry(4, "TABLE", vec![]),
            entry(3, "SEARCHPATH", vec![]),
            entry(2, "STDSTRINGS", vec![]),
            entry(1, "ENCODING", vec![]),
        ];
        let order = order_entries_for_write(&entries).unwrap();
        let descs: Vec<&str> = order.iter().map(|&i| entries[i].desc.as_str()).collect();
        assert_eq!(&descs[..3], &["ENCODING", "STDSTRINGS", "SEARCHPATH"]);
    }

    #[test]
    fn dependencies_respected_within_section() {
        let entries = vec![
            entry(10, "TABLE", vec![11]),
            entry(11, "SCHEMA", vec![]),
        ];
        let order = order_entries_for_write(&entries).unwrap();
        let positions: HashMap<i32, usize> = order
            .iter()
            .enumerate()
            .map(|(pos, &i)| (entries[i].dump_id, pos))
            .collect();
        assert!(positions[&11] < positions[&10]);
    }

    #[test]
    fn cycle_is_rejected() {
        let entries = vec![
            entry(1, "TABLE", vec![2]),
            entry(2, "TABLE", vec![1]),
        ];
        assert!(order_entries_for_write(&entries).is_err());
    }
}
