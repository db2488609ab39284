use std::fmt::Write;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;

use crate::control;
use crate::models::{ControlChartPoint, DateRange, MetricKind};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChartRow {
    week_start: NaiveDate,
    total_issues: usize,
    bugs: usize,
    bug_density: f64,
    velocity: usize,
    value: f64,
    ucl: f64,
    lcl: f64,
    center_line: f64,
    is_baseline: bool,
    out_of_limits: bool,
}

impl From<&ControlChartPoint> for ChartRow {
    fn from(point: &ControlChartPoint) -> Self {
        Self {
            week_start: point.week.week_start,
            total_issues: point.week.total_issues,
            bugs: point.week.bugs,
            bug_density: point.week.bug_density,
            velocity: point.week.velocity,
            value: point.value,
            ucl: point.ucl,
            lcl: point.lcl,
            center_line: point.center_line,
            is_baseline: point.is_baseline,
            out_of_limits: point.is_out_of_limits(),
        }
    }
}

pub fn default_export_name(metric: MetricKind, today: NaiveDate) -> String {
    format!("control-chart-{}-{}.csv", metric, today.format("%Y-%m-%d"))
}

pub fn write_chart_csv<W: std::io::Write>(
    writer: W,
    points: &[ControlChartPoint],
) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for point in points {
        csv.serialize(ChartRow::from(point))?;
    }
    csv.flush()?;
    Ok(())
}

pub fn export_chart_csv(path: &Path, points: &[ControlChartPoint]) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_chart_csv(file, points)
}

pub fn build_report(
    jql: &str,
    metric: MetricKind,
    baseline: Option<&DateRange>,
    points: &[ControlChartPoint],
) -> String {
    let mut output = String::new();
    let query_label = if jql.trim().is_empty() {
        "(no query)"
    } else {
        jql.trim()
    };

    let _ = writeln!(output, "# Control Chart Report");
    let _ = writeln!(output, "Query: `{}`", query_label);
    let _ = writeln!(output, "Metric: {}", metric.label());
    match baseline {
        Some(window) => {
            let _ = writeln!(output, "Baseline: {} to {}", window.start, window.end);
        }
        None => {
            let _ = writeln!(output, "Baseline: entire series");
        }
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Control Limits");

    match points.first() {
        None => {
            let _ = writeln!(output, "No resolved issues to analyze.");
            return output;
        }
        Some(first) => {
            let baseline_weeks = points.iter().filter(|p| p.is_baseline).count();
            if baseline_weeks == 0 {
                let _ = writeln!(output, "No data available in selected period.");
            }
            let _ = writeln!(output, "- Center line: {:.2}", first.center_line);
            let _ = writeln!(output, "- Upper control limit: {:.2}", first.ucl);
            let _ = writeln!(output, "- Lower control limit: {:.2}", first.lcl);
            let _ = writeln!(
                output,
                "- Baseline weeks: {} of {}",
                baseline_weeks,
                points.len()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Series");
    let _ = writeln!(output, "| Week | Resolved | Bugs | Value | Baseline | Signal |");
    let _ = writeln!(output, "|---|---|---|---|---|---|");
    for point in points {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {:.2} | {} | {} |",
            point.week.week_start,
            point.week.total_issues,
            point.week.bugs,
            point.value,
            if point.is_baseline { "yes" } else { "" },
            if point.is_out_of_limits() { "out of control" } else { "" }
        );
    }

    let flagged = control::out_of_control(points);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Out-of-Control Weeks");

    if flagged.is_empty() {
        let _ = writeln!(output, "All weeks are within the control limits.");
    } else {
        for point in flagged {
            let side = if point.value > point.ucl { "above UCL" } else { "below LCL" };
            let _ = writeln!(
                output,
                "- {}: {:.2} ({})",
                point.week.week_start, point.value, side
            );
        }
    }

    output
}
