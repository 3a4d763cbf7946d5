//! Append-only journal of performed calculations.
//!
//! Each calculation is appended to a JSONL (JSON Lines) file with file
//! locking, giving an audit trail of what was computed for whom. The journal
//! feeds the CSV export and is never read back by the engine itself.

use crate::{CalculationRecord, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Sink trait for persisting calculation records
pub trait RecordSink {
    fn append(&mut self, record: &CalculationRecord) -> Result<()>;
}

/// JSONL-based record sink with file locking
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Create a new JSONL sink for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl RecordSink for JsonlSink {
    fn append(&mut self, record: &CalculationRecord) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        file.unlock()?;

        tracing::debug!("Appended calculation {} to journal", record.id);
        Ok(())
    }
}

/// Read all records from a journal file.
///
/// Unparseable lines are skipped with a warning rather than failing the
/// whole read.
pub fn read_records(path: &Path) -> Result<Vec<CalculationRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<CalculationRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Failed to parse journal line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} records from journal", records.len());
    Ok(records)
}
