//! Test-interval method for cumulative 305-day yield.
//!
//! For a lactation sampled at days `d0 < d1 < ... < dn`:
//!
//! - `d0 * y0` covers day 0 up to the first sample (constant yield)
//! - trapezoids cover each pair of consecutive samples
//! - `(306 - dn) * yn` covers the last sample through day 305 (constant yield)
//!
//! The end bound of 306 is fixed policy; reference yields must stay comparable
//! with those already handed out to participants.

use crate::domain::{Estimation, LactationSeries, MAX_DAY_IN_MILK, SkippedLactation, YieldEstimate};

/// Exclusive day bound used by the end-of-lactation extrapolation.
const END_BOUND: f64 = 306.0;

/// Minimum in-range samples needed to integrate a lactation.
pub const MIN_SAMPLES: usize = 2;

/// Estimate the 305-day yield of one lactation, or report why it was skipped.
///
/// Records past day 305 are ignored. Ties on day keep their input order.
pub fn estimate(series: &LactationSeries) -> Estimation {
    let mut points: Vec<(u32, f64)> = series
        .records
        .iter()
        .filter(|r| r.day_in_milk <= MAX_DAY_IN_MILK)
        .map(|r| (r.day_in_milk, r.daily_yield))
        .collect();

    if points.len() < MIN_SAMPLES {
        return Estimation::Skipped(SkippedLactation {
            lactation_id: series.lactation_id.clone(),
            samples: points.len(),
        });
    }

    // Stable: equal days stay in input order.
    points.sort_by_key(|&(day, _)| day);

    Estimation::Estimated(YieldEstimate {
        lactation_id: series.lactation_id.clone(),
        total_305_yield: total_305_yield(&points),
        parity: series.first_parity(),
    })
}

/// Sum of the start, intermediate, and end contributions over day-sorted points.
fn total_305_yield(points: &[(u32, f64)]) -> f64 {
    let (first_day, first_yield) = points[0];
    let (last_day, last_yield) = points[points.len() - 1];

    let start = f64::from(first_day) * first_yield;
    let end = (END_BOUND - f64::from(last_day)) * last_yield;
    let intermediate: f64 = points.windows(2).map(|w| trapezoid(w[0], w[1])).sum();

    start + intermediate + end
}

fn trapezoid((d0, y0): (u32, f64), (d1, y1): (u32, f64)) -> f64 {
    f64::from(d1 - d0) * (y0 + y1) / 2.0
}
