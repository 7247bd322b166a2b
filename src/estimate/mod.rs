//! 305-day yield estimation over a whole dataset.
//!
//! Lactations are independent, so the batch runs them on the rayon pool and
//! collects back in first-appearance order.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::{DailyRecord, Estimation, LactationSeries, MAX_DAY_IN_MILK, SkippedLactation, YieldEstimate};
use crate::error::AppError;

pub mod interval;

pub use interval::{MIN_SAMPLES, estimate};

/// Output of one estimation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EstimationRun {
    pub estimates: Vec<YieldEstimate>,
    pub skipped: Vec<SkippedLactation>,
}

impl EstimationRun {
    pub fn test_ids(&self) -> Vec<String> {
        self.estimates.iter().map(|e| e.lactation_id.clone()).collect()
    }

    pub fn yields(&self) -> Vec<f64> {
        self.estimates.iter().map(|e| e.total_305_yield).collect()
    }

    pub fn parities(&self) -> Vec<Option<i64>> {
        self.estimates.iter().map(|e| e.parity).collect()
    }
}

/// Estimate every lactation in `records`.
///
/// Records past day 305 are dropped before grouping, so a lactation sampled
/// only after day 305 produces neither an estimate nor a skip. Parity is the
/// first value recorded for the lactation, in or out of range.
///
/// A total that overflows to infinity is rejected, since it cannot be stored
/// or compared.
pub fn estimate_all(records: &[DailyRecord]) -> Result<EstimationRun, AppError> {
    let parity_by_id = first_parities(records);

    let in_range: Vec<DailyRecord> = records
        .iter()
        .filter(|r| r.day_in_milk <= MAX_DAY_IN_MILK)
        .cloned()
        .collect();
    let dropped = records.len() - in_range.len();
    if dropped > 0 {
        debug!(dropped, "Dropped records past day {MAX_DAY_IN_MILK}");
    }

    let groups = LactationSeries::group(&in_range);
    let outcomes: Vec<Estimation> = groups.par_iter().map(estimate).collect();

    let mut run = EstimationRun::default();
    for outcome in outcomes {
        match outcome {
            Estimation::Estimated(mut e) => {
                if !e.total_305_yield.is_finite() {
                    return Err(AppError::invalid_input(format!(
                        "305-day yield for lactation {} is out of range; check its DailyMilkingYield values.",
                        e.lactation_id
                    )));
                }
                e.parity = parity_by_id.get(e.lactation_id.as_str()).copied().flatten();
                run.estimates.push(e);
            }
            Estimation::Skipped(s) => {
                info!(
                    lactation_id = %s.lactation_id,
                    samples = s.samples,
                    "Skipping lactation: not enough data points for interpolation"
                );
                run.skipped.push(s);
            }
        }
    }

    Ok(run)
}

fn first_parities(records: &[DailyRecord]) -> HashMap<&str, Option<i64>> {
    let mut out: HashMap<&str, Option<i64>> = HashMap::new();
    for r in records {
        let slot = out.entry(r.lactation_id.as_str()).or_insert(None);
        if slot.is_none() {
            *slot = r.parity;
        }
    }
    out
}
