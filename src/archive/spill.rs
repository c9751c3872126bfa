use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Result;

/// Backs table rows and blob bytes with per-entry gzip-compressed temp
/// files so an archive's data never has to sit fully in memory between
/// load and save. Each dump id gets at most one file, named `<dump_id>.gz`.
pub struct SpillStore {
    dir: PathBuf,
    owns_dir: bool,
}

impl SpillStore {
    pub fn new_temp() -> Result<Self> {
        let mut dir = std::env::temp_dir();
        dir.push(format!("pgarchive-spill-{}", std::process::id()));
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            owns_dir: true,
        })
    }

    pub fn at(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            owns_dir: false,
        })
    }

    fn path_for(&self, dump_id: i32) -> PathBuf {
        self.dir.join(format!("{dump_id}.gz"))
    }

    pub fn has(&self, dump_id: i32) -> bool {
        self.path_for(dump_id).exists()
    }

    /// Open a fresh gzip-compressed writer for `dump_id`, truncating any
    /// existing spill file.
    pub fn create_writer(&self, dump_id: i32) -> Result<GzEncoder<BufWriter<File>>> {
        let file = File::create(self.path_for(dump_id))?;
        Ok(GzEncoder::new(BufWriter::new(file), Compression::default()))
    }

    /// Open `dump_id`'s spill file for reading, decompressing as it is read.
    pub fn open_reader(&self, dump_id: i32) -> Result<GzDecoder<BufReader<File>>> {
        let file = File::open(self.path_for(dump_id))?;
        Ok(GzDecoder::new(BufReader::new(file)))
    }

    pub fn read_all(&self, dump_id: i32) -> Result<Vec<u8>> {
        if !self.has(dump_id) {
            return Ok(Vec::new());
        }
        let mut buf = Vec::new();
        self.open_reader(dump_id)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn write_all(&self, dump_id: i32, data: &[u8]) -> Result<()> {
        let mut w = self.create_writer(dump_id)?;
        w.write_all(data)?;
        w.finish()?.flush()?;
        Ok(())
    }
}

impl Drop for SpillStore {
    fn drop(&mut self) {
        if self.owns_dir {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}
