//! Parity-grouped comparison.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use super::PairedEntry;
use super::metrics::{MIN_PAIRS, compute_metrics, valid_pairs};
use crate::domain::{MetricsResult, ParityGroup};
use crate::error::AppError;

/// Metrics for one parity group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParityReport {
    pub group: ParityGroup,
    /// Ids in the group present in both the reference and the submission.
    pub pairs: usize,
    /// Reference vs submitted.
    pub reference: MetricsResult,
    /// External actual vs submitted.
    pub actual: MetricsResult,
    pub reference_yields: Vec<f64>,
    pub submitted_yields: Vec<f64>,
    pub actual_yields: Vec<f64>,
}

/// Columns of one group, index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupColumns {
    pub reference: Vec<f64>,
    pub submitted: Vec<f64>,
    pub actual: Vec<f64>,
}

/// Split paired entries by parity group.
pub fn partition(entries: &[PairedEntry]) -> BTreeMap<ParityGroup, GroupColumns> {
    let mut groups: BTreeMap<ParityGroup, GroupColumns> = BTreeMap::new();
    for e in entries {
        let cols = groups.entry(ParityGroup::from_parity(e.parity)).or_default();
        cols.reference.push(e.reference);
        cols.submitted.push(e.submitted);
        cols.actual.push(e.actual);
    }
    groups
}

/// Per-group metrics for parities 1, 2 and 3+.
///
/// A group is reported only when both the reference and the actual comparison
/// have at least two valid pairs. Entries with unknown parity are never reported.
pub fn compare_by_parity(entries: &[PairedEntry]) -> Result<Vec<ParityReport>, AppError> {
    let groups = partition(entries);

    let reports: Vec<Option<ParityReport>> = ParityGroup::REPORTED
        .par_iter()
        .map(|group| {
            let Some(cols) = groups.get(group) else {
                return Ok(None);
            };
            let ref_pairs = valid_pairs(&cols.reference, &cols.submitted);
            let actual_pairs = valid_pairs(&cols.actual, &cols.submitted);
            if ref_pairs < MIN_PAIRS || actual_pairs < MIN_PAIRS {
                debug!(%group, ref_pairs, actual_pairs, "Parity group has too few pairs; not reported");
                return Ok(None);
            }

            Ok(Some(ParityReport {
                group: *group,
                pairs: cols.reference.len(),
                reference: compute_metrics(&cols.reference, &cols.submitted)?,
                actual: compute_metrics(&cols.actual, &cols.submitted)?,
                reference_yields: cols.reference.clone(),
                submitted_yields: cols.submitted.clone(),
                actual_yields: cols.actual.clone(),
            }))
        })
        .collect::<Result<_, AppError>>()?;

    Ok(reports.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, parity: Option<i64>, reference: f64, submitted: f64, actual: f64) -> PairedEntry {
        PairedEntry {
            id: id.to_string(),
            parity,
            reference,
            submitted,
            actual,
        }
    }

    #[test]
    fn partition_collapses_higher_parities() {
        let entries = vec![
            entry("a", Some(1), 1.0, 1.0, 1.0),
            entry("b", Some(3), 2.0, 2.0, 2.0),
            entry("c", Some(5), 3.0, 3.0, 3.0),
            entry("d", None, 4.0, 4.0, 4.0),
        ];
        let groups = partition(&entries);
        assert_eq!(groups[&ParityGroup::First].reference, vec![1.0]);
        assert_eq!(groups[&ParityGroup::ThirdPlus].reference, vec![2.0, 3.0]);
        assert_eq!(groups[&ParityGroup::Unknown].reference, vec![4.0]);
    }

    #[test]
    fn groups_need_two_valid_pairs_on_both_sides() {
        let entries = vec![
            // parity 1: fully populated
            entry("a", Some(1), 6000.0, 6100.0, 6050.0),
            entry("b", Some(1), 7000.0, 6900.0, 7100.0),
            entry("c", Some(1), 8000.0, 8200.0, 7900.0),
            // parity 2: only one actual value
            entry("d", Some(2), 6500.0, 6400.0, 6600.0),
            entry("e", Some(2), 7500.0, 7400.0, f64::NAN),
            // 3+: two of each
            entry("f", Some(4), 9000.0, 9100.0, 9050.0),
            entry("g", Some(3), 9500.0, 9400.0, 9600.0),
            // unknown parity is never reported
            entry("h", None, 5000.0, 5000.0, 5000.0),
            entry("i", Some(0), 5100.0, 5100.0, 5100.0),
        ];
        let reports = compare_by_parity(&entries).unwrap();
        let labels: Vec<&str> = reports.iter().map(|r| r.group.label()).collect();
        assert_eq!(labels, vec!["1", "3+"]);

        let first = &reports[0];
        assert_eq!(first.pairs, 3);
        assert!((first.reference.mae - 400.0 / 3.0).abs() < 1e-9);
        assert!(first.actual.rmse > 0.0);
    }

    #[test]
    fn empty_input_reports_nothing() {
        assert!(compare_by_parity(&[]).unwrap().is_empty());
    }
}
