//! CSV ingest and normalization.
//!
//! Three inputs reach the service as CSV:
//!
//! - the full test-day dataset (`TestId`, `DaysInMilk`, `DailyMilkingYield`, optional `Parity`)
//! - external actual lactation totals (`TestId`, `TotalActualProduction`)
//! - a participant submission (`TestObjectID`, `CalculatedMilkYield (kg)`)
//!
//! Design goals:
//! - **Strict schema** for required columns (clear `InvalidInput` errors)
//! - **Blank cells skip the row**, but non-numeric values abort the dataset
//! - **Raw rows are kept** so a sampled subset can be written back verbatim

use std::collections::{HashMap, HashSet};

use csv::StringRecord;

use crate::domain::{DailyRecord, normalize_id, parse_parity};
use crate::error::AppError;

const COL_TEST_ID: &str = "testid";
const COL_DAYS_IN_MILK: &str = "daysinmilk";
const COL_DAILY_YIELD: &str = "dailymilkingyield";
const COL_PARITY: &str = "parity";
const COL_ACTUAL_TOTAL: &str = "totalactualproduction";
const COL_SUBMITTED_ID: &str = "testobjectid";
const COL_SUBMITTED_YIELD: &str = "calculatedmilkyield (kg)";

/// A row that was read but not used, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowNote {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// One dataset row: the raw CSV fields plus the parsed record, if complete.
#[derive(Debug, Clone)]
pub struct DatasetRow {
    pub line: usize,
    pub lactation_id: String,
    pub raw: StringRecord,
    /// `None` when the day or yield cell was blank.
    pub record: Option<DailyRecord>,
}

/// Ingested test-day dataset.
#[derive(Debug, Clone)]
pub struct DailyDataset {
    pub headers: StringRecord,
    pub rows: Vec<DatasetRow>,
    pub notes: Vec<RowNote>,
    pub has_parity: bool,
}

impl DailyDataset {
    /// Complete records, in file order.
    pub fn records(&self) -> Vec<DailyRecord> {
        self.rows.iter().filter_map(|r| r.record.clone()).collect()
    }

    /// Distinct lactation ids, in order of first appearance.
    pub fn lactation_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|r| seen.insert(r.lactation_id.as_str()))
            .map(|r| r.lactation_id.clone())
            .collect()
    }

    /// Rows belonging to `ids`, keeping file order.
    pub fn subset(&self, ids: &HashSet<String>) -> DailyDataset {
        DailyDataset {
            headers: self.headers.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| ids.contains(&r.lactation_id))
                .cloned()
                .collect(),
            notes: Vec::new(),
            has_parity: self.has_parity,
        }
    }
}

/// Parse the test-day dataset.
pub fn read_daily_dataset(bytes: &[u8]) -> Result<DailyDataset, AppError> {
    let mut reader = reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| AppError::invalid_input(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let id_idx = require_column(&header_map, COL_TEST_ID, "TestId")?;
    let day_idx = require_column(&header_map, COL_DAYS_IN_MILK, "DaysInMilk")?;
    let yield_idx = require_column(&header_map, COL_DAILY_YIELD, "DailyMilkingYield")?;
    let parity_idx = header_map.get(COL_PARITY).copied();

    let mut rows = Vec::new();
    let mut notes = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        // +2: 1-based lines, plus the header line.
        let line = idx + 2;
        let raw = result.map_err(|e| AppError::invalid_input(format!("CSV parse error on line {line}: {e}")))?;

        let Some(lactation_id) = cell(&raw, id_idx).map(normalize_id) else {
            notes.push(RowNote {
                line,
                id: None,
                message: "Missing `TestId`.".to_string(),
            });
            continue;
        };

        let day = parse_number(&raw, day_idx, line, "DaysInMilk")?;
        let daily_yield = parse_number(&raw, yield_idx, line, "DailyMilkingYield")?;

        let record = match (day, daily_yield) {
            (Some(day), Some(daily_yield)) => {
                if day < 0.0 || day.fract() != 0.0 || day > f64::from(u32::MAX) {
                    return Err(AppError::invalid_input(format!(
                        "Invalid `DaysInMilk` on line {line} (TestId {lactation_id}): expected a whole number >= 0, got {day}."
                    )));
                }
                if daily_yield < 0.0 {
                    return Err(AppError::invalid_input(format!(
                        "Invalid `DailyMilkingYield` on line {line} (TestId {lactation_id}): must be >= 0, got {daily_yield}."
                    )));
                }
                Some(DailyRecord {
                    lactation_id: lactation_id.clone(),
                    day_in_milk: day as u32,
                    daily_yield,
                    parity: parity_idx.and_then(|i| cell(&raw, i)).and_then(parse_parity),
                })
            }
            _ => {
                notes.push(RowNote {
                    line,
                    id: Some(lactation_id.clone()),
                    message: "Blank `DaysInMilk` or `DailyMilkingYield`; row not used for estimation.".to_string(),
                });
                None
            }
        };

        rows.push(DatasetRow {
            line,
            lactation_id,
            raw,
            record,
        });
    }

    if rows.is_empty() {
        return Err(AppError::invalid_input("Dataset contains no rows with a `TestId`."));
    }

    Ok(DailyDataset {
        headers,
        rows,
        notes,
        has_parity: parity_idx.is_some(),
    })
}

/// Parse external actual lactation totals into an id → total map.
///
/// Rows with a blank id or total are ignored.
pub fn read_actual_yields(bytes: &[u8]) -> Result<HashMap<String, f64>, AppError> {
    let mut reader = reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| AppError::invalid_input(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let id_idx = require_column(&header_map, COL_TEST_ID, "TestId")?;
    let total_idx = require_column(&header_map, COL_ACTUAL_TOTAL, "TotalActualProduction")?;

    let mut out = HashMap::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let raw = result.map_err(|e| AppError::invalid_input(format!("CSV parse error on line {line}: {e}")))?;
        let Some(id) = cell(&raw, id_idx).map(normalize_id) else {
            continue;
        };
        if let Some(total) = parse_number(&raw, total_idx, line, "TotalActualProduction")? {
            out.insert(id, total);
        }
    }

    Ok(out)
}

/// Parse a participant's submission into `(id, yield)` pairs.
///
/// Rows with a blank id or yield are dropped. A repeated id keeps the
/// position of its first row and the value of its last.
pub fn read_submission(bytes: &[u8]) -> Result<Vec<(String, f64)>, AppError> {
    let mut reader = reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| AppError::invalid_input(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let (Some(&id_idx), Some(&yield_idx)) = (header_map.get(COL_SUBMITTED_ID), header_map.get(COL_SUBMITTED_YIELD))
    else {
        return Err(AppError::invalid_input(
            "Submission must contain 'TestObjectID' and 'CalculatedMilkYield (kg)' columns.",
        ));
    };

    let mut out: Vec<(String, f64)> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let raw = result.map_err(|e| AppError::invalid_input(format!("CSV parse error on line {line}: {e}")))?;
        let Some(id) = cell(&raw, id_idx).map(normalize_id) else {
            continue;
        };
        let Some(value) = parse_number(&raw, yield_idx, line, "CalculatedMilkYield (kg)")? else {
            continue;
        };

        match position.get(&id) {
            Some(&i) => out[i].1 = value,
            None => {
                position.insert(id.clone(), out.len());
                out.push((id, value));
            }
        }
    }

    if out.is_empty() {
        return Err(AppError::invalid_input("Submission contains no usable rows."));
    }

    Ok(out)
}

fn reader(bytes: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn require_column(header_map: &HashMap<String, usize>, key: &str, display: &str) -> Result<usize, AppError> {
    header_map
        .get(key)
        .copied()
        .ok_or_else(|| AppError::invalid_input(format!("Missing required column: `{display}`")))
}

fn cell(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).map(str::trim).filter(|s| !s.is_empty())
}

/// `Ok(None)` for a blank cell, an error for anything that is not a finite number.
fn parse_number(record: &StringRecord, idx: usize, line: usize, column: &str) -> Result<Option<f64>, AppError> {
    let Some(s) = cell(record, idx) else {
        return Ok(None);
    };
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        Ok(_) if s.eq_ignore_ascii_case("nan") => Ok(None),
        _ => Err(AppError::invalid_input(format!(
            "Non-numeric `{column}` value '{s}' on line {line}."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const DATASET: &str = "\u{feff}TestId,DaysInMilk,DailyMilkingYield,Parity,Herd\n\
        1001,10,25.5,1,H1\n\
        1001,40,30,1,H1\n\
        1002.0,5,20,3,H2\n\
        1002,,18,3,H2\n\
        ,20,10,2,H3\n";

    #[test]
    fn reads_dataset_and_keeps_raw_rows() {
        let ds = read_daily_dataset(DATASET.as_bytes()).unwrap();
        assert!(ds.has_parity);
        assert_eq!(ds.rows.len(), 4);
        assert_eq!(ds.lactation_ids(), vec!["1001", "1002"]);

        let records = ds.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].lactation_id, "1002");
        assert_eq!(records[2].parity, Some(3));
        assert_eq!(records[0].day_in_milk, 10);

        // Blank day and blank id are notes, not errors.
        assert_eq!(ds.notes.len(), 2);
        assert_eq!(ds.notes[0].line, 5);
        assert_eq!(ds.notes[1].line, 6);

        assert_eq!(ds.rows[0].raw.get(4), Some("H1"));
    }

    #[test]
    fn subset_keeps_file_order() {
        let ds = read_daily_dataset(DATASET.as_bytes()).unwrap();
        let ids: HashSet<String> = ["1002".to_string()].into_iter().collect();
        let sub = ds.subset(&ids);
        assert_eq!(sub.rows.len(), 2);
        assert!(sub.rows.iter().all(|r| r.lactation_id == "1002"));
        assert_eq!(sub.headers.len(), 5);
    }

    #[test]
    fn missing_column_is_invalid_input() {
        let err = read_daily_dataset(b"TestId,DaysInMilk\n1,2\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("DailyMilkingYield"), "{err}");
    }

    #[test]
    fn non_numeric_yield_is_invalid_input() {
        let err = read_daily_dataset(b"TestId,DaysInMilk,DailyMilkingYield\n1,2,lots\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn fractional_or_negative_day_is_rejected() {
        assert!(read_daily_dataset(b"TestId,DaysInMilk,DailyMilkingYield\n1,2.5,10\n").is_err());
        assert!(read_daily_dataset(b"TestId,DaysInMilk,DailyMilkingYield\n1,-1,10\n").is_err());
        assert!(read_daily_dataset(b"TestId,DaysInMilk,DailyMilkingYield\n1,12.0,10\n").is_ok());
    }

    #[test]
    fn dataset_without_parity_column() {
        let ds = read_daily_dataset(b"testid,daysinmilk,dailymilkingyield\nA,1,2\n").unwrap();
        assert!(!ds.has_parity);
        assert_eq!(ds.records()[0].parity, None);
    }

    #[test]
    fn submission_dedupes_and_drops_blanks() {
        let csv = "TestObjectID, CalculatedMilkYield (kg) \n\
            1001.0,9000\n\
            1002,\n\
            1003,7000.5\n\
            1001,9100\n";
        let rows = read_submission(csv.as_bytes()).unwrap();
        assert_eq!(rows, vec![("1001".to_string(), 9100.0), ("1003".to_string(), 7000.5)]);
    }

    #[test]
    fn submission_requires_both_columns() {
        let err = read_submission(b"TestObjectID,Yield\n1,2\n").unwrap_err();
        assert!(err.to_string().contains("TestObjectID"));
    }

    #[test]
    fn actual_yields_map() {
        let csv = "TestId,TotalActualProduction\n1001,9050\n1002,\n1003.0,7100\n";
        let map = read_actual_yields(csv.as_bytes()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["1003"], 7100.0);
    }
}
