use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use pgarchive::archive::{Archive, DataState};
use pgarchive::convert::{Cell, DefaultConverter, NoOpConverter, SmartConverter};
use pgarchive::error::PgArchiveError;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn temp_archive_path(name: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let mut path = std::env::temp_dir();
    path.push(format!("pgarchive-itest-{}-{}-{name}.dump", std::process::id(), n));
    path
}

fn build_sample(path: &PathBuf) {
    let mut archive = Archive::new("widgets", "UTF8", "14.0").unwrap();

    let schema_id = archive
        .add_entry("SCHEMA", "public", "public", "CREATE SCHEMA public;", "", "", "postgres", vec![])
        .unwrap();
    let table_id = archive
        .add_entry(
            "TABLE",
            "users",
            "public",
            "CREATE TABLE public.users (id integer, name text);",
            "DROP TABLE public.users;",
            "",
            "postgres",
            vec![schema_id],
        )
        .unwrap();
    let writer = archive.table_data_writer(table_id, &["id", "name"]).unwrap();
    writer.append_row(&["1", "Alice"]).unwrap();
    writer.append_row(&["2", "Bob\\tSmith"]).unwrap();
    writer.append_row(&["3", "\\N"]).unwrap();

    let blobs_id = archive
        .add_entry("BLOBS", "", "", "", "", "", "postgres", vec![])
        .unwrap();
    archive.add_blob(blobs_id, 16384, b"hello blob").unwrap();
    archive.add_blob(blobs_id, 16385, b"").unwrap();

    archive.save(path).unwrap();
}

#[test]
fn round_trip_preserves_entries_except_offset() {
    let path = temp_archive_path("roundtrip");
    build_sample(&path);

    let loaded = Archive::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.dbname, "widgets");
    assert_eq!(loaded.encoding, "UTF8");

    let schema = loaded.lookup_entry("SCHEMA", "public", "public").unwrap();
    assert_eq!(schema.owner, "postgres");

    let table = loaded.lookup_entry("TABLE", "public", "users").unwrap();
    assert_eq!(table.defn, "CREATE TABLE public.users (id integer, name text);");
    assert_eq!(table.drop_stmt, "DROP TABLE public.users;");
    assert_eq!(table.dependencies, vec![schema.dump_id]);

    let data = loaded.lookup_entry("TABLE DATA", "public", "users").unwrap();
    assert_eq!(data.copy_stmt, "COPY public.users (id, name) FROM stdin;");
    assert_eq!(data.dependencies, vec![table.dump_id]);
    assert_eq!(data.data_state, DataState::PosSet);
}

#[test]
fn round_trip_preserves_table_rows() {
    let path = temp_archive_path("rows");
    build_sample(&path);

    let loaded = Archive::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let rows = loaded.table_data("public", "users", &SmartConverter).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], vec![Cell::Int(1), Cell::String("Alice".to_string())]);
    assert_eq!(rows[1], vec![Cell::Int(2), Cell::String("Bob\tSmith".to_string())]);
    assert_eq!(rows[2], vec![Cell::Int(3), Cell::Null]);

    let default_rows = loaded.table_data("public", "users", &DefaultConverter).unwrap();
    assert_eq!(default_rows[2][1], None);

    let raw_rows = loaded.table_data("public", "users", &NoOpConverter).unwrap();
    assert_eq!(raw_rows[2][1], b"\\N");
}

#[test]
fn round_trip_preserves_blobs() {
    let path = temp_archive_path("blobs");
    build_sample(&path);

    let loaded = Archive::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let mut blobs = loaded.blobs().unwrap();
    blobs.sort_by_key(|(oid, _)| *oid);
    assert_eq!(blobs, vec![(16384, b"hello blob".to_vec()), (16385, Vec::new())]);
}

#[test]
fn table_data_writer_returns_same_handle_across_calls() {
    let mut archive = Archive::new("widgets", "UTF8", "14.0").unwrap();
    let table_id = archive
        .add_entry("TABLE", "t", "public", "CREATE TABLE public.t (v text);", "", "", "", vec![])
        .unwrap();

    let w1 = archive.table_data_writer(table_id, &["v"]).unwrap();
    w1.append_row(&["first"]).unwrap();
    let w2 = archive.table_data_writer(table_id, &["v"]).unwrap();
    w2.append_row(&["second"]).unwrap();

    let path = temp_archive_path("shared-writer");
    archive.save(&path).unwrap();

    let loaded = Archive::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let rows = loaded.table_data("public", "t", &NoOpConverter).unwrap();
    assert_eq!(rows, vec![vec![b"first".to_vec()], vec![b"second".to_vec()]]);
}

#[test]
fn empty_table_round_trips_as_no_data() {
    let mut archive = Archive::new("widgets", "UTF8", "14.0").unwrap();
    let table_id = archive
        .add_entry("TABLE", "empty", "public", "CREATE TABLE public.empty (v text);", "", "", "", vec![])
        .unwrap();
    archive.table_data_writer(table_id, &["v"]).unwrap();

    let path = temp_archive_path("empty-table");
    archive.save(&path).unwrap();

    let loaded = Archive::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let entry = loaded.lookup_entry("TABLE DATA", "public", "empty").unwrap();
    assert_eq!(entry.data_state, DataState::NoData);
    let rows = loaded.table_data("public", "empty", &NoOpConverter).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn add_entry_rejects_unknown_descriptor() {
    let mut archive = Archive::new("widgets", "UTF8", "14.0").unwrap();
    let err = archive
        .add_entry("NOT A REAL DESCRIPTOR", "t", "public", "", "", "", "", vec![])
        .unwrap_err();
    assert!(matches!(err, PgArchiveError::InvalidDescriptor(_)));
}

#[test]
fn add_entry_rejects_unknown_dependency() {
    let mut archive = Archive::new("widgets", "UTF8", "14.0").unwrap();
    let err = archive
        .add_entry("TABLE", "t", "public", "", "", "", "", vec![999])
        .unwrap_err();
    assert!(matches!(err, PgArchiveError::UnknownDependency(999)));
}

#[test]
fn load_rejects_missing_file() {
    let err = Archive::load("/nonexistent/path/to/archive.dump").unwrap_err();
    assert!(matches!(err, PgArchiveError::PathMissing(_)));
}

#[test]
fn bootstrap_entries_present_on_new_archive() {
    let archive = Archive::new("widgets", "UTF8", "12.4").unwrap();
    assert_eq!(archive.header.version_tuple(), (1, 14, 0));
    assert!(archive.lookup_entry("ENCODING", "", "ENCODING").is_some());
    assert!(archive.lookup_entry("STDSTRINGS", "", "STDSTRINGS").is_some());
    assert!(archive.lookup_entry("SEARCHPATH", "", "SEARCHPATH").is_some());
}

#[test]
fn new_rejects_unsupported_server_version() {
    assert!(Archive::new("widgets", "UTF8", "7.4").is_err());
}
