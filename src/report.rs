use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::Snapshot;

pub fn build_report(scope: Option<&str>, cutoff: DateTime<Utc>, snapshot: &Snapshot) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all units");

    let _ = writeln!(output, "# Unit Performance Report");
    let _ = writeln!(
        output,
        "Generated for {} (reports since {})",
        scope_label,
        cutoff.date_naive()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Leaderboard");

    if snapshot.leaderboard.is_empty() {
        let _ = writeln!(output, "No scored reports in this window.");
    } else {
        for row in &snapshot.leaderboard {
            let delta = match row.delta {
                Some(value) => format!("{value:+.1}"),
                None => "n/a".to_string(),
            };
            let _ = writeln!(
                output,
                "{}. {} — mean score {:.1} across {} scored reports (change {})",
                row.rank, row.unit, row.mean_score, row.report_count, delta
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Indicator Comparison");

    if snapshot.comparison.rows.is_empty() {
        let _ = writeln!(output, "No scored reports in this window.");
    } else {
        for row in &snapshot.comparison.rows {
            let _ = writeln!(
                output,
                "- {} (overall mean {:.1})",
                row.indicator, row.overall_mean
            );
            for unit in &snapshot.comparison.units {
                match row.per_unit.get(unit) {
                    Some(mean) => {
                        let _ = writeln!(output, "  - {unit}: {mean:.1}");
                    }
                    None => {
                        let _ = writeln!(output, "  - {unit}: no scored reports");
                    }
                }
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Activity");

    if snapshot.trend.is_empty() {
        let _ = writeln!(output, "No reports in this window.");
    } else {
        for point in &snapshot.trend {
            let _ = writeln!(
                output,
                "- {}: {} reports ({} approved, {} rejected)",
                point.month_label, point.total, point.approved, point.rejected
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Report Mix");

    if snapshot.composition.is_empty() {
        let _ = writeln!(output, "No reports in this window.");
    } else {
        for slice in &snapshot.composition {
            let _ = writeln!(output, "- {}: {} reports", slice.indicator, slice.count);
        }
    }

    output
}
