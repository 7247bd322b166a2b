//! Comparison of submitted yields against reference and actual yields.
//!
//! - `metrics`: Pearson r / RMSE / MAE / MAPE over aligned series
//! - `parity`: the same metrics split by parity group
//!
//! This module owns alignment by id; the metric functions only see
//! index-aligned slices.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::domain::{Generate, MetricsResult, Submission};
use crate::error::AppError;

pub mod metrics;
pub mod parity;

pub use metrics::{MIN_PAIRS, compute_metrics, valid_pairs};
pub use parity::{ParityReport, compare_by_parity, partition};

/// One reference lactation with its parity.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEntry {
    pub id: String,
    pub value: f64,
    pub parity: Option<i64>,
}

/// Everything a comparison needs, before alignment.
#[derive(Debug, Clone, Default)]
pub struct ComparisonInput {
    pub reference: Vec<ReferenceEntry>,
    pub submitted: Vec<(String, f64)>,
    /// External actual yields by id, when available.
    pub actual: Option<HashMap<String, f64>>,
}

impl ComparisonInput {
    /// Build the input from a stored test set and a submission against it.
    pub fn from_records(generate: &Generate, submission: &Submission, actual: Option<HashMap<String, f64>>) -> Self {
        let reference = generate
            .test_obj_ids
            .iter()
            .zip(&generate.calculated_milk_yields)
            .enumerate()
            .map(|(i, (id, value))| ReferenceEntry {
                id: id.clone(),
                value: *value,
                parity: generate.parity_at(i),
            })
            .collect();

        Self {
            reference,
            submitted: submission.yields(),
            actual,
        }
    }
}

/// A lactation present in both the reference and the submission.
///
/// `actual` is NaN when no external value exists for the id.
#[derive(Debug, Clone, PartialEq)]
pub struct PairedEntry {
    pub id: String,
    pub parity: Option<i64>,
    pub reference: f64,
    pub submitted: f64,
    pub actual: f64,
}

/// Full comparison output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    /// Reference vs submitted, over ids present in both.
    pub overall: MetricsResult,
    /// Actual vs submitted, over submitted ids; `None` without actual yields.
    pub actual: Option<MetricsResult>,
    pub parity_groups: Vec<ParityReport>,
    pub ids: Vec<String>,
    pub reference_yields: Vec<f64>,
    pub submitted_yields: Vec<f64>,
    /// Submitted ids with no reference counterpart.
    pub unmatched: usize,
}

/// Pair reference and submitted values by id, in reference order.
pub fn pair_entries(input: &ComparisonInput) -> Vec<PairedEntry> {
    let submitted: HashMap<&str, f64> = input.submitted.iter().map(|(id, v)| (id.as_str(), *v)).collect();

    input
        .reference
        .iter()
        .filter_map(|r| {
            let s = submitted.get(r.id.as_str())?;
            let actual = input
                .actual
                .as_ref()
                .and_then(|m| m.get(&r.id))
                .copied()
                .unwrap_or(f64::NAN);
            Some(PairedEntry {
                id: r.id.clone(),
                parity: r.parity,
                reference: r.value,
                submitted: *s,
                actual,
            })
        })
        .collect()
}

/// Compare a submission against the reference (and actual yields if given).
pub fn compare(input: &ComparisonInput) -> Result<ComparisonReport, AppError> {
    let paired = pair_entries(input);

    let reference_yields: Vec<f64> = paired.iter().map(|e| e.reference).collect();
    let submitted_yields: Vec<f64> = paired.iter().map(|e| e.submitted).collect();
    let overall = compute_metrics(&reference_yields, &submitted_yields)?;

    let actual = match &input.actual {
        Some(map) => {
            let (actual_vals, submitted_vals): (Vec<f64>, Vec<f64>) = input
                .submitted
                .iter()
                .map(|(id, v)| (map.get(id).copied().unwrap_or(f64::NAN), *v))
                .unzip();
            Some(compute_metrics(&actual_vals, &submitted_vals)?)
        }
        None => None,
    };

    let parity_groups = compare_by_parity(&paired)?;

    let known: HashSet<&str> = input.reference.iter().map(|r| r.id.as_str()).collect();
    let unmatched = input
        .submitted
        .iter()
        .filter(|(id, _)| !known.contains(id.as_str()))
        .count();

    Ok(ComparisonReport {
        overall,
        actual,
        parity_groups,
        ids: paired.iter().map(|e| e.id.clone()).collect(),
        reference_yields,
        submitted_yields,
        unmatched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(entries: &[(&str, f64, Option<i64>)]) -> Vec<ReferenceEntry> {
        entries
            .iter()
            .map(|(id, v, p)| ReferenceEntry {
                id: id.to_string(),
                value: *v,
                parity: *p,
            })
            .collect()
    }

    #[test]
    fn only_shared_ids_are_compared() {
        let input = ComparisonInput {
            reference: reference(&[("1", 100.0, Some(1)), ("2", 200.0, Some(2)), ("3", 300.0, Some(3))]),
            submitted: vec![("3".into(), 300.0), ("1".into(), 100.0), ("9".into(), 5.0)],
            actual: None,
        };
        let report = compare(&input).unwrap();
        assert_eq!(report.ids, vec!["1", "3"]);
        assert_eq!(report.reference_yields, vec![100.0, 300.0]);
        assert_eq!(report.submitted_yields, vec![100.0, 300.0]);
        assert_eq!(report.unmatched, 1);
        assert_eq!(report.overall.rmse, 0.0);
        assert!(report.actual.is_none());
        assert!(report.parity_groups.is_empty());
    }

    #[test]
    fn actual_series_feeds_overall_and_groups() {
        let input = ComparisonInput {
            reference: reference(&[
                ("a", 6000.0, Some(1)),
                ("b", 7000.0, Some(1)),
                ("c", 8000.0, Some(2)),
                ("d", 9000.0, Some(2)),
                ("e", 9500.0, None),
            ]),
            submitted: vec![
                ("a".into(), 6100.0),
                ("b".into(), 6900.0),
                ("c".into(), 8100.0),
                ("d".into(), 8800.0),
                ("e".into(), 9400.0),
            ],
            actual: Some(HashMap::from([
                ("a".to_string(), 6050.0),
                ("b".to_string(), 7050.0),
                ("c".to_string(), 8050.0),
                ("d".to_string(), 9050.0),
            ])),
        };
        let report = compare(&input).unwrap();
        let actual = report.actual.unwrap();
        assert!(actual.mae > 0.0);

        let labels: Vec<&str> = report.parity_groups.iter().map(|g| g.group.label()).collect();
        assert_eq!(labels, vec!["1", "2"]);
        assert_eq!(report.parity_groups[1].pairs, 2);
    }

    #[test]
    fn builds_input_from_stored_records() {
        let mut g = Generate::new("u-1");
        g.test_obj_ids = vec!["1".into(), "2".into()];
        g.calculated_milk_yields = vec![10.0, 20.0];
        g.parity = vec![Some(1)];
        let mut s = Submission::new(&g.id);
        s.test_obj_ids = vec!["2".into()];
        s.calculated_milk_yields = vec![21.0];

        let input = ComparisonInput::from_records(&g, &s, None);
        assert_eq!(input.reference[0].parity, Some(1));
        assert_eq!(input.reference[1].parity, None);

        let paired = pair_entries(&input);
        assert_eq!(paired.len(), 1);
        assert_eq!(paired[0].submitted, 21.0);
        assert!(paired[0].actual.is_nan());
    }
}
