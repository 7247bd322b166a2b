//! Shared pipelines used by both the CLI and the HTTP service.
//!
//! dataset -> sample lactations -> subset CSV + reference estimates
//! test set + submission (+ actual yields) -> comparison report
//!
//! Everything here is synchronous and CPU-bound; the service calls it from
//! `spawn_blocking`.

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::compare::{ComparisonInput, ComparisonReport, ReferenceEntry, compare};
use crate::data::select_lactations;
use crate::domain::{Generate, Submission};
use crate::error::AppError;
use crate::estimate::{EstimationRun, estimate_all};
use crate::io::{DailyDataset, dataset_csv};

/// A sampled test set with its reference estimates.
#[derive(Debug, Clone)]
pub struct TestSet {
    pub selected: Vec<String>,
    pub subset: DailyDataset,
    /// The subset serialized with every original column.
    pub csv: Vec<u8>,
    pub run: EstimationRun,
    /// Aligned with `run.estimates`; empty when the dataset has no parity column.
    pub parities: Vec<Option<i64>>,
}

impl TestSet {
    /// Copy the reference estimates into a stored test-set record.
    pub fn fill(&self, generate: &mut Generate) {
        generate.test_obj_ids = self.run.test_ids();
        generate.calculated_milk_yields = self.run.yields();
        generate.parity = self.parities.clone();
    }
}

/// Sample `size` lactations from `dataset` and estimate their 305-day yields.
pub fn build_test_set(dataset: &DailyDataset, size: usize, seed: u64) -> Result<TestSet, AppError> {
    if size == 0 {
        return Err(AppError::invalid_input("Sample size must be > 0."));
    }

    let ids = dataset.lactation_ids();
    let selected = select_lactations(&ids, size, seed);
    let chosen: HashSet<String> = selected.iter().cloned().collect();
    let subset = dataset.subset(&chosen);
    let csv = dataset_csv(&subset)?;

    let run = estimate_all(&subset.records())?;
    let parities = if subset.has_parity { run.parities() } else { Vec::new() };

    info!(
        available = ids.len(),
        selected = selected.len(),
        estimated = run.estimates.len(),
        skipped = run.skipped.len(),
        "Built test set"
    );

    Ok(TestSet {
        selected,
        subset,
        csv,
        run,
        parities,
    })
}

/// Compare submitted yields against estimates computed from a full dataset.
pub fn compare_dataset(
    dataset: &DailyDataset,
    submitted: Vec<(String, f64)>,
    actual: Option<HashMap<String, f64>>,
) -> Result<ComparisonReport, AppError> {
    let run = estimate_all(&dataset.records())?;
    let reference = run
        .estimates
        .into_iter()
        .map(|e| ReferenceEntry {
            id: e.lactation_id,
            value: e.total_305_yield,
            parity: e.parity,
        })
        .collect();
    compare(&ComparisonInput {
        reference,
        submitted,
        actual,
    })
}

/// Compare a stored submission against its test set.
pub fn compare_submission(
    generate: &Generate,
    submission: &Submission,
    actual: Option<HashMap<String, f64>>,
) -> Result<ComparisonReport, AppError> {
    let input = ComparisonInput::from_records(generate, submission, actual);
    let report = compare(&input)?;
    info!(
        submission_id = %submission.id,
        paired = report.ids.len(),
        unmatched = report.unmatched,
        groups = report.parity_groups.len(),
        "Compared submission"
    );
    Ok(report)
}
