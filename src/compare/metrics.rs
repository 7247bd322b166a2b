//! Agreement metrics between a reference series and a submitted series.

use nalgebra::DVector;
use tracing::debug;

use crate::domain::MetricsResult;
use crate::error::AppError;

/// Minimum valid pairs before metrics are computed.
pub const MIN_PAIRS: usize = 2;

/// Pearson r, RMSE, MAE, and MAPE between index-aligned series.
///
/// Pairs where either side is non-finite are dropped first. With fewer than
/// [`MIN_PAIRS`] left, every metric is 0. Zero reference values are left out
/// of the MAPE mean only. A zero-variance side gives a correlation of 0.
pub fn compute_metrics(reference: &[f64], submitted: &[f64]) -> Result<MetricsResult, AppError> {
    if reference.len() != submitted.len() {
        return Err(AppError::invalid_input(format!(
            "Cannot compare series of different lengths ({} reference vs {} submitted).",
            reference.len(),
            submitted.len()
        )));
    }

    let (r, s): (Vec<f64>, Vec<f64>) = reference
        .iter()
        .zip(submitted)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip();

    if r.len() < MIN_PAIRS {
        debug!(valid_pairs = r.len(), "Too few valid pairs; reporting zero metrics");
        return Ok(MetricsResult::DEGENERATE);
    }

    let r = DVector::from_vec(r);
    let s = DVector::from_vec(s);
    let n = r.len() as f64;
    let diff = &r - &s;

    Ok(MetricsResult {
        pearson_correlation: pearson(&r, &s),
        rmse: (diff.norm_squared() / n).sqrt(),
        mae: diff.map(f64::abs).sum() / n,
        mape: mape(&r, &diff),
    })
}

/// Number of index pairs where both values are finite.
pub fn valid_pairs(a: &[f64], b: &[f64]) -> usize {
    a.iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .count()
}

fn pearson(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let ac = a.add_scalar(-a.mean());
    let bc = b.add_scalar(-b.mean());
    let denom = ac.norm() * bc.norm();
    if !(denom.is_finite() && denom > 0.0) {
        return 0.0;
    }
    (ac.dot(&bc) / denom).clamp(-1.0, 1.0)
}

fn mape(reference: &DVector<f64>, diff: &DVector<f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (r, d) in reference.iter().zip(diff.iter()) {
        if *r != 0.0 {
            sum += (d / r).abs();
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    sum / count as f64 * 100.0
}
