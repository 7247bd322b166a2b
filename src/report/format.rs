//! Formatted terminal / attachment output.
//!
//! Formatting lives here so the estimation and comparison code stays free of
//! presentation concerns, and output changes stay localized.

use serde::Serialize;

use crate::compare::{ComparisonReport, ParityReport};
use crate::domain::MetricsResult;
use crate::estimate::EstimationRun;

/// Submission metadata printed at the top of a comparison report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportDetails {
    pub submission_id: String,
    pub test_set_id: String,
    pub participant: String,
    pub organization: String,
    pub country: String,
    pub calculation_method: String,
    pub notes: String,
    pub date_reported: String,
    pub dataset_link: String,
}

/// Estimates table plus skipped lactations.
pub fn format_estimates(run: &EstimationRun) -> String {
    let mut out = String::new();

    out.push_str("=== 305-day yield estimates (test interval method) ===\n");
    out.push_str(&format!(
        "Lactations: estimated={} | skipped={}\n\n",
        run.estimates.len(),
        run.skipped.len()
    ));

    out.push_str(&format!("{:<16} {:>7} {:>14}\n", "TestId", "Parity", "Total305 (kg)"));
    for e in &run.estimates {
        let parity = e.parity.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("{:<16} {:>7} {:>14.2}\n", e.lactation_id, parity, e.total_305_yield));
    }

    if !run.skipped.is_empty() {
        out.push_str("\nSkipped (fewer than 2 records within 305 days):\n");
        for s in &run.skipped {
            out.push_str(&format!("  {} ({} record(s))\n", s.lactation_id, s.samples));
        }
    }

    out
}

/// Full comparison report.
pub fn format_comparison(details: &ReportDetails, report: &ComparisonReport) -> String {
    let mut out = String::new();

    out.push_str("=== ICAR 305-day yield comparison ===\n");
    let rows = [
        ("Submission", &details.submission_id),
        ("Test set", &details.test_set_id),
        ("Participant", &details.participant),
        ("Organization", &details.organization),
        ("Country", &details.country),
        ("Method", &details.calculation_method),
        ("Reported", &details.date_reported),
        ("Dataset", &details.dataset_link),
        ("Notes", &details.notes),
    ];
    for (label, value) in rows {
        if !value.is_empty() {
            out.push_str(&format!("{label:<13}: {value}\n"));
        }
    }
    out.push_str(&format!(
        "Lactations   : compared={} | not in test set={}\n",
        report.ids.len(),
        report.unmatched
    ));

    out.push_str("\nReference vs submitted:\n");
    out.push_str(&format_metrics(&report.overall));

    if let Some(actual) = &report.actual {
        out.push_str("\nActual (ICAR) vs submitted:\n");
        out.push_str(&format_metrics(actual));
    }

    if !report.parity_groups.is_empty() {
        out.push_str("\nBy parity:\n");
        out.push_str(&format_parity_table(&report.parity_groups));
    }

    out
}

/// One metrics block, indented.
pub fn format_metrics(m: &MetricsResult) -> String {
    format!(
        "  Pearson r : {:.4}\n  RMSE      : {:.2} kg\n  MAE       : {:.2} kg\n  MAPE      : {:.2} %\n",
        m.pearson_correlation, m.rmse, m.mae, m.mape
    )
}

fn format_parity_table(groups: &[ParityReport]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "  {:<6} {:>5} | {:>8} {:>10} {:>10} {:>8} | {:>8} {:>10} {:>10} {:>8}\n",
        "Parity", "n", "r(ref)", "RMSE", "MAE", "MAPE%", "r(act)", "RMSE", "MAE", "MAPE%"
    ));
    for g in groups {
        out.push_str(&format!(
            "  {:<6} {:>5} | {:>8.4} {:>10.2} {:>10.2} {:>8.2} | {:>8.4} {:>10.2} {:>10.2} {:>8.2}\n",
            g.group.label(),
            g.pairs,
            g.reference.pearson_correlation,
            g.reference.rmse,
            g.reference.mae,
            g.reference.mape,
            g.actual.pearson_correlation,
            g.actual.rmse,
            g.actual.mae,
            g.actual.mape,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParityGroup, SkippedLactation, YieldEstimate};

    #[test]
    fn estimates_table_lists_skips() {
        let run = EstimationRun {
            estimates: vec![YieldEstimate {
                lactation_id: "1001".into(),
                total_305_yield: 4595.0,
                parity: Some(2),
            }],
            skipped: vec![SkippedLactation {
                lactation_id: "1002".into(),
                samples: 1,
            }],
        };
        let text = format_estimates(&run);
        assert!(text.contains("estimated=1 | skipped=1"));
        assert!(text.contains("4595.00"));
        assert!(text.contains("1002 (1 record(s))"));
    }

    #[test]
    fn comparison_report_sections() {
        let m = MetricsResult {
            pearson_correlation: 0.98765,
            rmse: 120.5,
            mae: 100.25,
            mape: 1.5,
        };
        let report = ComparisonReport {
            overall: m,
            actual: None,
            parity_groups: vec![ParityReport {
                group: ParityGroup::ThirdPlus,
                pairs: 3,
                reference: m,
                actual: m,
                reference_yields: vec![],
                submitted_yields: vec![],
                actual_yields: vec![],
            }],
            ids: vec!["1".into(), "2".into()],
            reference_yields: vec![],
            submitted_yields: vec![],
            unmatched: 1,
        };
        let details = ReportDetails {
            submission_id: "s-1".into(),
            calculation_method: "Test interval".into(),
            ..Default::default()
        };

        let text = format_comparison(&details, &report);
        assert!(text.contains("Submission   : s-1"));
        assert!(!text.contains("Country"));
        assert!(text.contains("compared=2 | not in test set=1"));
        assert!(text.contains("Pearson r : 0.9877"));
        assert!(!text.contains("Actual (ICAR)"));
        assert!(text.contains("  3+ "));
    }
}
