//! The build checkpoint file.
//!
//! Phase 1 streams entries to an NDJSON file instead of holding them in
//! memory; full-history walks over multi-gigabyte chains stay O(1) in
//! entry storage. The file is private to a single build.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::SnapshotError;
use crate::types::SnapshotEntry;

/// Streams entries to the checkpoint file, one JSON document per line.
pub struct CheckpointWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    count: usize,
}

impl CheckpointWriter {
    pub fn create(path: &Path) -> Result<Self, SnapshotError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            path: path.to_path_buf(),
            count: 0,
        })
    }

    pub fn append(&mut self, entry: &SnapshotEntry) -> Result<(), SnapshotError> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer.write_all(b"\n")?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Flush and close; the file stays on disk for the read-back pass.
    pub fn finish(mut self) -> Result<PathBuf, SnapshotError> {
        self.writer.flush()?;
        Ok(self.path)
    }
}

/// Read every entry back from a checkpoint file, in file order.
pub fn read_entries(path: &Path) -> Result<Vec<SnapshotEntry>, SnapshotError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

/// Best-effort removal once the build is done.
pub fn remove(path: &Path) {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
}
