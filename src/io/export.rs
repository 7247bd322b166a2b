//! CSV exports.
//!
//! Generated test sets are written back with every original column so the
//! participant receives the same shape as the full dataset.

use std::path::Path;

use crate::domain::YieldEstimate;
use crate::error::AppError;
use crate::io::ingest::DailyDataset;

/// Serialize a dataset (usually a sampled subset) to CSV bytes.
///
/// Rows missing trailing cells are padded with empty cells up to the header
/// width; longer rows are written as read.
pub fn dataset_csv(dataset: &DailyDataset) -> Result<Vec<u8>, AppError> {
    let width = dataset.headers.len();
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    writer
        .write_record(&dataset.headers)
        .map_err(|e| AppError::storage(format!("Failed to write dataset CSV header: {e}")))?;
    for row in &dataset.rows {
        let padding = width.saturating_sub(row.raw.len());
        writer
            .write_record(row.raw.iter().chain(std::iter::repeat_n("", padding)))
            .map_err(|e| AppError::storage(format!("Failed to write dataset CSV row {}: {e}", row.line)))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::storage(format!("Failed to finish dataset CSV: {e}")))
}

/// Serialize estimates as `TestId,Total305Yield`.
pub fn estimates_csv(estimates: &[YieldEstimate]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["TestId", "Total305Yield"])
        .map_err(|e| AppError::storage(format!("Failed to write estimates CSV header: {e}")))?;
    for e in estimates {
        writer
            .write_record([e.lactation_id.as_str(), &format!("{:.4}", e.total_305_yield)])
            .map_err(|err| AppError::storage(format!("Failed to write estimate for {}: {err}", e.lactation_id)))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::storage(format!("Failed to finish estimates CSV: {e}")))
}

/// Write bytes to `path`, creating parent directories.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::storage(format!("Failed to create directory '{}': {e}", parent.display())))?;
    }
    std::fs::write(path, bytes).map_err(|e| AppError::storage(format!("Failed to write '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ingest::read_daily_dataset;

    #[test]
    fn subset_csv_keeps_every_column() {
        let input = "TestId,DaysInMilk,DailyMilkingYield,Herd\n1,10,20,\"North, A\"\n2,5,15,South\n";
        let ds = read_daily_dataset(input.as_bytes()).unwrap();
        let ids = ["1".to_string()].into_iter().collect();
        let out = String::from_utf8(dataset_csv(&ds.subset(&ids)).unwrap()).unwrap();
        assert_eq!(out, "TestId,DaysInMilk,DailyMilkingYield,Herd\n1,10,20,\"North, A\"\n");
    }

    #[test]
    fn short_rows_are_padded_to_header_width() {
        let input = "TestId,DaysInMilk,DailyMilkingYield,Parity\n1,10,20\n1,100,30,1\n";
        let ds = read_daily_dataset(input.as_bytes()).unwrap();
        let out = String::from_utf8(dataset_csv(&ds).unwrap()).unwrap();
        assert_eq!(out, "TestId,DaysInMilk,DailyMilkingYield,Parity\n1,10,20,\n1,100,30,1\n");
    }

    #[test]
    fn estimates_csv_layout() {
        let est = vec![YieldEstimate {
            lactation_id: "7".into(),
            total_305_yield: 4595.0,
            parity: None,
        }];
        let out = String::from_utf8(estimates_csv(&est).unwrap()).unwrap();
        assert_eq!(out, "TestId,Total305Yield\n7,4595.0000\n");
    }

    #[test]
    fn write_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generated").join("x.csv");
        write_file(&path, b"a\n").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"a\n");
    }
}
