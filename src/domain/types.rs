//! Shared domain types.
//!
//! These types are plain data so they can be:
//!
//! - produced by CSV ingest and consumed by the estimator
//! - compared by the metrics engine
//! - serialized into API responses and the object store

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Last day (inclusive) of the standard lactation window.
pub const MAX_DAY_IN_MILK: u32 = 305;

/// One test-day reading for a lactation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub lactation_id: String,
    pub day_in_milk: u32,
    pub daily_yield: f64,
    pub parity: Option<i64>,
}

/// Test-day readings sharing a lactation id.
///
/// Days need not be contiguous, sorted, or start at 0.
#[derive(Debug, Clone, PartialEq)]
pub struct LactationSeries {
    pub lactation_id: String,
    pub records: Vec<DailyRecord>,
}

impl LactationSeries {
    /// Group records by lactation id, in the order ids first appear.
    pub fn group(records: &[DailyRecord]) -> Vec<LactationSeries> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut out: Vec<LactationSeries> = Vec::new();

        for record in records {
            match index.get(record.lactation_id.as_str()) {
                Some(&i) => out[i].records.push(record.clone()),
                None => {
                    index.insert(&record.lactation_id, out.len());
                    out.push(LactationSeries {
                        lactation_id: record.lactation_id.clone(),
                        records: vec![record.clone()],
                    });
                }
            }
        }

        out
    }

    /// First non-missing parity in input order.
    pub fn first_parity(&self) -> Option<i64> {
        self.records.iter().find_map(|r| r.parity)
    }
}

/// Cumulative 305-day yield for one lactation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldEstimate {
    pub lactation_id: String,
    pub total_305_yield: f64,
    pub parity: Option<i64>,
}

/// A lactation left out of the estimate because it had too few in-range samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLactation {
    pub lactation_id: String,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Estimation {
    Estimated(YieldEstimate),
    Skipped(SkippedLactation),
}

/// Agreement statistics between two paired series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsResult {
    pub pearson_correlation: f64,
    #[serde(rename = "root_mean_squared_error")]
    pub rmse: f64,
    #[serde(rename = "mean_absolute_error")]
    pub mae: f64,
    #[serde(rename = "mean_absolute_percentage_error")]
    pub mape: f64,
}

impl MetricsResult {
    /// Result reported when fewer than two valid pairs remain.
    pub const DEGENERATE: MetricsResult = MetricsResult {
        pearson_correlation: 0.0,
        rmse: 0.0,
        mae: 0.0,
        mape: 0.0,
    };
}

/// Parity category used to split comparison statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParityGroup {
    /// Missing, non-numeric, or below 1.
    #[serde(rename = "0")]
    Unknown,
    #[serde(rename = "1")]
    First,
    #[serde(rename = "2")]
    Second,
    #[serde(rename = "3+")]
    ThirdPlus,
}

impl ParityGroup {
    /// Groups that appear in comparison reports, in report order.
    pub const REPORTED: [ParityGroup; 3] = [ParityGroup::First, ParityGroup::Second, ParityGroup::ThirdPlus];

    pub fn from_parity(parity: Option<i64>) -> Self {
        match parity {
            Some(1) => ParityGroup::First,
            Some(2) => ParityGroup::Second,
            Some(p) if p >= 3 => ParityGroup::ThirdPlus,
            _ => ParityGroup::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ParityGroup::Unknown => "0",
            ParityGroup::First => "1",
            ParityGroup::Second => "2",
            ParityGroup::ThirdPlus => "3+",
        }
    }
}

impl fmt::Display for ParityGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Normalize an opaque test id so spreadsheet round-trips still match.
///
/// `"123.0"` and `" 123 "` both become `"123"`; anything else is only trimmed.
pub fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains('.') {
        if let Ok(v) = trimmed.parse::<f64>() {
            if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
                return format!("{}", v as i64);
            }
        }
    }
    trimmed.to_string()
}

/// Parse a parity cell leniently: `"2"` and `"2.0"` are parity 2, anything else is missing.
pub fn parse_parity(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(v);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, day: u32, y: f64, parity: Option<i64>) -> DailyRecord {
        DailyRecord {
            lactation_id: id.to_string(),
            day_in_milk: day,
            daily_yield: y,
            parity,
        }
    }

    #[test]
    fn parity_groups_collapse_three_and_above() {
        let labels: Vec<&str> = [1, 2, 3, 4, 5]
            .into_iter()
            .map(|p| ParityGroup::from_parity(Some(p)).label())
            .collect();
        assert_eq!(labels, vec!["1", "2", "3+", "3+", "3+"]);

        assert_eq!(ParityGroup::from_parity(None), ParityGroup::Unknown);
        assert_eq!(ParityGroup::from_parity(Some(0)), ParityGroup::Unknown);
        assert_eq!(serde_json::to_string(&ParityGroup::ThirdPlus).unwrap(), "\"3+\"");
    }

    #[test]
    fn group_keeps_first_appearance_order() {
        let records = vec![
            rec("b", 10, 20.0, None),
            rec("a", 5, 30.0, Some(2)),
            rec("b", 40, 25.0, Some(1)),
        ];
        let groups = LactationSeries::group(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].lactation_id, "b");
        assert_eq!(groups[0].records.len(), 2);
        assert_eq!(groups[0].first_parity(), Some(1));
        assert_eq!(groups[1].lactation_id, "a");
    }

    #[test]
    fn ids_and_parities_normalize() {
        assert_eq!(normalize_id(" 123.0 "), "123");
        assert_eq!(normalize_id("A-17"), "A-17");
        assert_eq!(normalize_id("12.5"), "12.5");
        assert_eq!(parse_parity("3"), Some(3));
        assert_eq!(parse_parity("2.0"), Some(2));
        assert_eq!(parse_parity("heifer"), None);
        assert_eq!(parse_parity(""), None);
    }
}
