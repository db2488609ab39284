use std::collections::HashMap;

use chrono::{Datelike, Days, NaiveDate};
use tracing::warn;

use crate::models::{Issue, WeeklyMetric};

/// Monday of the ISO week containing `date`, or `None` when that Monday falls
/// before the first representable date.
pub fn week_start(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_sub_days(Days::new(date.weekday().num_days_from_monday() as u64))
}

pub fn bug_density(bugs: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        bugs as f64 / total as f64 * 100.0
    }
}

/// Reduces resolved issues to one record per week, oldest week first.
/// Unresolved issues are ignored.
pub fn aggregate_weekly(issues: &[Issue]) -> Vec<WeeklyMetric> {
    let mut weeks: HashMap<NaiveDate, (usize, usize)> = HashMap::new();

    for issue in issues {
        let Some(resolved_at) = issue.fields.resolutiondate else {
            continue;
        };

        let Some(week) = week_start(resolved_at.date_naive()) else {
            warn!(key = %issue.key, "skipping issue resolved outside the calendar range");
            continue;
        };

        let entry = weeks.entry(week).or_insert((0, 0));
        entry.0 += 1;
        if issue.is_bug() {
            entry.1 += 1;
        }
    }

    let mut metrics: Vec<WeeklyMetric> = weeks
        .into_iter()
        .map(|(week_start, (total, bugs))| WeeklyMetric {
            week_start,
            total_issues: total,
            bugs,
            bug_density: bug_density(bugs, total),
            velocity: total,
        })
        .collect();

    metrics.sort_by(|a, b| a.week_start.cmp(&b.week_start));
    metrics
}
