//! CSV export for archiving journaled calculations.
//!
//! Converts the JSONL journal into an appendable CSV report and archives
//! the journal atomically so records are never exported twice.

use crate::{CalculationRecord, Result};
use std::fs::OpenOptions;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    id: String,
    calculated_at: String,
    medication: String,
    weight_kg: f64,
    age_in_months: f64,
    dose_mg: f64,
    dose_ml: f64,
    frequency: String,
    source: String,
    capped: bool,
}

impl From<&CalculationRecord> for CsvRow {
    fn from(record: &CalculationRecord) -> Self {
        CsvRow {
            id: record.id.to_string(),
            calculated_at: record.calculated_at.to_rfc3339(),
            medication: record.medication.clone(),
            weight_kg: record.weight_kg,
            age_in_months: record.age_in_months,
            dose_mg: record.dose_mg,
            dose_ml: record.dose_ml,
            frequency: record.frequency.clone(),
            source: format!("{:?}", record.source).to_lowercase(),
            capped: record.capped,
        }
    }
}

/// Export journal records to CSV and archive the journal atomically
///
/// This function:
/// 1. Reads all records from the journal
/// 2. Appends them to the CSV file (creates with headers if needed)
/// 3. Syncs the CSV to disk
/// 4. Renames the journal to .processed
/// 5. Returns the number of records exported
///
/// # Safety
/// - CSV is fsynced before the journal is renamed
/// - The journal is renamed (not deleted) to allow manual recovery
pub fn journal_to_csv_and_archive(journal_path: &Path, csv_path: &Path) -> Result<usize> {
    let records = crate::journal::read_records(journal_path)?;

    if records.is_empty() {
        tracing::info!("No records in journal to export");
        return Ok(0);
    }

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    // Headers only when the file is brand new
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for record in &records {
        let row = CsvRow::from(record);
        writer.serialize(row)?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    tracing::info!("Wrote {} records to CSV", records.len());

    let processed_path = journal_path.with_extension("jsonl.processed");
    std::fs::rename(journal_path, &processed_path)?;

    tracing::info!("Archived journal to {:?}", processed_path);

    Ok(records.len())
}

/// Clean up old processed journal files in a directory
pub fn cleanup_processed_journals(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if let Some(extension) = path.extension() {
            if extension == "processed" {
                std::fs::remove_file(&path)?;
                tracing::debug!("Removed processed journal: {:?}", path);
                count += 1;
            }
        }
    }

    if count > 0 {
        tracing::info!("Cleaned up {} processed journal files", count);
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{JsonlSink, RecordSink};
    use crate::{CalculationRecord, CalculationResult, RuleSource};
    use std::fs::File;

    fn sample_record(medication: &str) -> CalculationRecord {
        let result = CalculationResult {
            dose_mg: 500.0,
            dose_ml: 5.0,
            frequency: "Every 8 hours".into(),
            reference: "test".into(),
            reference_url: String::new(),
            reference_label: "Reference - Amoxicillin".into(),
            comment: None,
            max_dose_message: None,
            source: RuleSource::Catalog,
        };
        CalculationRecord::from_result(medication, 10.0, 48.0, &result)
    }

    #[test]
    fn test_export_creates_csv_and_archives() {
        let temp_dir = tempfile::tempdir().unwrap();
        let journal_path = temp_dir.path().join("calculations.jsonl");
        let csv_path = temp_dir.path().join("calculations.csv");

        let mut sink = JsonlSink::new(&journal_path);
        for i in 0..3 {
            sink.append(&sample_record(&format!("Med {}", i))).unwrap();
        }

        let count = journal_to_csv_and_archive(&journal_path, &csv_path).unwrap();
        assert_eq!(count, 3);

        assert!(csv_path.exists());
        assert!(!journal_path.exists());
        assert!(journal_path.with_extension("jsonl.processed").exists());
    }

    #[test]
    fn test_export_appends_on_second_run() {
        let temp_dir = tempfile::tempdir().unwrap();
        let journal_path = temp_dir.path().join("calculations.jsonl");
        let csv_path = temp_dir.path().join("calculations.csv");

        let mut sink = JsonlSink::new(&journal_path);
        sink.append(&sample_record("Amoxicillin")).unwrap();
        assert_eq!(
            journal_to_csv_and_archive(&journal_path, &csv_path).unwrap(),
            1
        );

        let mut sink = JsonlSink::new(&journal_path);
        sink.append(&sample_record("Ibuprofen")).unwrap();
        assert_eq!(
            journal_to_csv_and_archive(&journal_path, &csv_path).unwrap(),
            1
        );

        let reader = csv::Reader::from_path(&csv_path).unwrap();
        let record_count = reader.into_records().count();
        assert_eq!(record_count, 2);
    }

    #[test]
    fn test_empty_journal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let journal_path = temp_dir.path().join("empty.jsonl");
        let csv_path = temp_dir.path().join("calculations.csv");

        File::create(&journal_path).unwrap();

        let count = journal_to_csv_and_archive(&journal_path, &csv_path).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_cleanup_processed_journals() {
        let temp_dir = tempfile::tempdir().unwrap();

        File::create(temp_dir.path().join("a.jsonl.processed")).unwrap();
        File::create(temp_dir.path().join("b.jsonl.processed")).unwrap();
        File::create(temp_dir.path().join("keep.jsonl")).unwrap();

        let count = cleanup_processed_journals(temp_dir.path()).unwrap();
        assert_eq!(count, 2);

        assert!(temp_dir.path().join("keep.jsonl").exists());
    }
}
