use chrono::NaiveDate;

use crate::models::{ControlChartPoint, DateRange, MetricKind, WeeklyMetric};

/// Shewhart limits derived from a baseline sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlLimits {
    pub center_line: f64,
    pub ucl: f64,
    pub lcl: f64,
}

impl ControlLimits {
    /// Degraded limits used when the baseline window matches no weeks.
    pub const NONE: ControlLimits = ControlLimits {
        center_line: 0.0,
        ucl: 0.0,
        lcl: 0.0,
    };

    /// Mean ± 3σ with the population standard deviation. `lcl` is floored at zero.
    /// Returns `None` for an empty sample.
    pub fn from_sample(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let sigma = variance.sqrt();

        Some(ControlLimits {
            center_line: mean,
            ucl: mean + 3.0 * sigma,
            lcl: (mean - 3.0 * sigma).max(0.0),
        })
    }
}

/// A week belongs to the baseline when its start date falls inside the window.
/// With no window every week is baseline.
pub fn in_baseline(week_start: NaiveDate, baseline: Option<&DateRange>) -> bool {
    baseline.map_or(true, |window| window.contains(week_start))
}

/// Builds the chart series: one point per week, in input order, all sharing the
/// limits computed from the baseline weeks.
pub fn control_chart(
    metrics: &[WeeklyMetric],
    baseline: Option<&DateRange>,
    kind: MetricKind,
) -> Vec<ControlChartPoint> {
    let sample: Vec<f64> = metrics
        .iter()
        .filter(|m| in_baseline(m.week_start, baseline))
        .map(|m| m.value(kind))
        .collect();

    let (limits, mark_baseline) = match ControlLimits::from_sample(&sample) {
        Some(limits) => (limits, true),
        None => (ControlLimits::NONE, false),
    };

    metrics
        .iter()
        .map(|week| ControlChartPoint {
            week: week.clone(),
            value: week.value(kind),
            ucl: limits.ucl,
            lcl: limits.lcl,
            center_line: limits.center_line,
            is_baseline: mark_baseline && in_baseline(week.week_start, baseline),
        })
        .collect()
}

/// Window used when none has been chosen: the first week on record through today.
pub fn default_baseline(metrics: &[WeeklyMetric], today: NaiveDate) -> Option<DateRange> {
    metrics.first().map(|first| DateRange {
        start: first.week_start,
        end: today,
    })
}

/// Moves one or both ends of the window. A missing end is kept from `current`,
/// falling back to the first week (start) or `today` (end). End-before-start is
/// accepted as given.
pub fn adjust_baseline(
    current: Option<&DateRange>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    metrics: &[WeeklyMetric],
    today: NaiveDate,
) -> Option<DateRange> {
    let start = start
        .or(current.map(|window| window.start))
        .or(metrics.first().map(|m| m.week_start))?;
    let end = end.or(current.map(|window| window.end)).unwrap_or(today);
    Some(DateRange { start, end })
}

pub fn baseline_has_data(metrics: &[WeeklyMetric], baseline: &DateRange) -> bool {
    metrics.iter().any(|m| baseline.contains(m.week_start))
}

pub fn out_of_control(points: &[ControlChartPoint]) -> Vec<&ControlChartPoint> {
    points.iter().filter(|p| p.is_out_of_limits()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weekly::tests::issue;
    use crate::weekly::{aggregate_weekly, bug_density};
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn week(start: NaiveDate, total: usize, bugs: usize) -> WeeklyMetric {
        WeeklyMetric {
            week_start: start,
            total_issues: total,
            bugs,
            bug_density: bug_density(bugs, total),
            velocity: total,
        }
    }

    fn two_weeks() -> Vec<WeeklyMetric> {
        let issues = vec![
            issue("W1-1", Some("2024-01-02T10:00:00.000+0000"), "Bug"),
            issue("W1-2", Some("2024-01-03T10:00:00.000+0000"), "Story"),
            issue("W2-1", Some("2024-01-08T10:00:00.000+0000"), "Story"),
            issue("W2-2", Some("2024-01-09T10:00:00.000+0000"), "Task"),
            issue("W2-3", Some("2024-01-10T10:00:00.000+0000"), "Story"),
            issue("W2-4", Some("2024-01-11T10:00:00.000+0000"), "Task"),
        ];
        aggregate_weekly(&issues)
    }

    #[test]
    fn full_series_baseline_matches_reference_limits() {
        let weekly = two_weeks();
        assert_eq!(weekly[0].bug_density, 50.0);
        assert_eq!(weekly[1].bug_density, 0.0);

        let points = control_chart(&weekly, None, MetricKind::BugDensity);
        assert_eq!(points.len(), 2);
        for point in &points {
            assert_eq!(point.center_line, 25.0);
            assert_eq!(point.ucl, 100.0);
            assert_eq!(point.lcl, 0.0);
            assert!(point.is_baseline);
        }
        assert_eq!(points[0].value, 50.0);
        assert_eq!(points[1].value, 0.0);
    }

    #[test]
    fn window_outside_data_degrades_to_zero_limits() {
        let weekly = two_weeks();
        let window = DateRange {
            start: date(2023, 6, 1),
            end: date(2023, 6, 30),
        };

        let points = control_chart(&weekly, Some(&window), MetricKind::BugDensity);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, 50.0);
        assert_eq!(points[1].value, 0.0);
        for point in &points {
            assert_eq!(point.ucl, 0.0);
            assert_eq!(point.lcl, 0.0);
            assert_eq!(point.center_line, 0.0);
            assert!(!point.is_baseline);
        }
    }

    #[test]
    fn empty_series_yields_empty_chart() {
        let weekly = aggregate_weekly(&[]);
        assert!(weekly.is_empty());
        assert!(control_chart(&weekly, None, MetricKind::Velocity).is_empty());
    }

    #[test]
    fn reversed_window_matches_nothing() {
        let weekly = two_weeks();
        let window = DateRange {
            start: date(2024, 1, 8),
            end: date(2024, 1, 1),
        };
        let points = control_chart(&weekly, Some(&window), MetricKind::Velocity);
        assert!(points.iter().all(|p| !p.is_baseline && p.ucl == 0.0));
    }

    #[test]
    fn partial_window_limits_come_from_baseline_only() {
        let weekly = vec![
            week(date(2024, 1, 1), 4, 0),
            week(date(2024, 1, 8), 6, 0),
            week(date(2024, 1, 15), 20, 0),
        ];
        let window = DateRange {
            start: date(2024, 1, 1),
            end: date(2024, 1, 8),
        };

        let points = control_chart(&weekly, Some(&window), MetricKind::Velocity);
        assert_eq!(points[0].center_line, 5.0);
        assert_eq!(points[0].ucl, 8.0);
        assert_eq!(points[0].lcl, 2.0);
        assert!(points[0].is_baseline);
        assert!(points[1].is_baseline);
        assert!(!points[2].is_baseline);
        assert!(points[2].is_out_of_limits());
        assert_eq!(out_of_control(&points).len(), 1);
    }

    #[test]
    fn window_end_day_is_inclusive() {
        let weekly = vec![week(date(2024, 1, 1), 3, 1), week(date(2024, 1, 8), 5, 1)];
        let window = DateRange {
            start: date(2024, 1, 8),
            end: date(2024, 1, 8),
        };
        let points = control_chart(&weekly, Some(&window), MetricKind::Velocity);
        assert!(!points[0].is_baseline);
        assert!(points[1].is_baseline);
        assert_eq!(points[1].center_line, 5.0);
        assert_eq!(points[1].ucl, 5.0);
    }

    #[test]
    fn limits_use_population_deviation() {
        let limits = ControlLimits::from_sample(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(limits.center_line, 5.0);
        assert_eq!(limits.ucl, 11.0);
        assert_eq!(limits.lcl, 0.0);
        assert!(ControlLimits::from_sample(&[]).is_none());
    }

    #[test]
    fn default_baseline_spans_first_week_to_today() {
        let weekly = two_weeks();
        let today = date(2024, 3, 1);
        assert_eq!(
            default_baseline(&weekly, today),
            Some(DateRange {
                start: date(2024, 1, 1),
                end: today,
            })
        );
        assert_eq!(default_baseline(&[], today), None);
    }

    #[test]
    fn adjusting_one_end_keeps_the_other() {
        let weekly = two_weeks();
        let today = date(2024, 3, 1);
        let current = DateRange {
            start: date(2024, 1, 1),
            end: date(2024, 2, 1),
        };

        let moved = adjust_baseline(Some(&current), Some(date(2024, 1, 8)), None, &weekly, today);
        assert_eq!(
            moved,
            Some(DateRange {
                start: date(2024, 1, 8),
                end: date(2024, 2, 1),
            })
        );

        let fresh = adjust_baseline(None, None, Some(date(2024, 1, 20)), &weekly, today);
        assert_eq!(
            fresh,
            Some(DateRange {
                start: date(2024, 1, 1),
                end: date(2024, 1, 20),
            })
        );

        assert_eq!(adjust_baseline(None, None, None, &[], today), None);
    }

    #[test]
    fn detects_windows_without_data() {
        let weekly = two_weeks();
        let empty = DateRange {
            start: date(2024, 2, 1),
            end: date(2024, 2, 28),
        };
        let full = DateRange {
            start: date(2023, 12, 1),
            end: date(2024, 1, 31),
        };
        assert!(!baseline_has_data(&weekly, &empty));
        assert!(baseline_has_data(&weekly, &full));
    }

    fn arb_weeks() -> impl Strategy<Value = Vec<WeeklyMetric>> {
        prop::collection::vec((1usize..40, 0usize..40), 0..30).prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (total, bugs))| {
                    week(
                        date(2024, 1, 1) + chrono::Duration::weeks(i as i64),
                        total,
                        bugs.min(total),
                    )
                })
                .collect()
        })
    }

    fn arb_kind() -> impl Strategy<Value = MetricKind> {
        prop_oneof![Just(MetricKind::BugDensity), Just(MetricKind::Velocity)]
    }

    fn arb_window() -> impl Strategy<Value = Option<DateRange>> {
        prop::option::of((0i64..250, 0i64..250).prop_map(|(a, b)| DateRange {
            start: date(2024, 1, 1) + chrono::Duration::days(a),
            end: date(2024, 1, 1) + chrono::Duration::days(b),
        }))
    }

    proptest! {
        #[test]
        fn limits_are_ordered_and_non_negative(
            weekly in arb_weeks(),
            window in arb_window(),
            kind in arb_kind(),
        ) {
            let points = control_chart(&weekly, window.as_ref(), kind);
            prop_assert_eq!(points.len(), weekly.len());
            for point in &points {
                prop_assert!(point.lcl >= 0.0);
                prop_assert!(point.ucl >= point.center_line);
                prop_assert!(point.center_line >= point.lcl);
            }
        }

        #[test]
        fn no_window_centers_on_series_mean(weekly in arb_weeks(), kind in arb_kind()) {
            prop_assume!(!weekly.is_empty());
            let points = control_chart(&weekly, None, kind);
            let mean = weekly.iter().map(|w| w.value(kind)).sum::<f64>() / weekly.len() as f64;
            for point in &points {
                prop_assert!((point.center_line - mean).abs() < 1e-9);
                prop_assert!(point.is_baseline);
            }
        }

        #[test]
        fn chart_is_deterministic(
            weekly in arb_weeks(),
            window in arb_window(),
            kind in arb_kind(),
        ) {
            let first = control_chart(&weekly, window.as_ref(), kind);
            let second = control_chart(&weekly, window.as_ref(), kind);
            prop_assert_eq!(first.len(), second.len());
            for (a, b) in first.iter().zip(&second) {
                prop_assert_eq!(a.ucl.to_bits(), b.ucl.to_bits());
                prop_assert_eq!(a.lcl.to_bits(), b.lcl.to_bits());
                prop_assert_eq!(a.center_line.to_bits(), b.center_line.to_bits());
                prop_assert_eq!(a.value.to_bits(), b.value.to_bits());
                prop_assert_eq!(a.is_baseline, b.is_baseline);
            }
        }

        #[test]
        fn series_order_is_preserved(weekly in arb_weeks(), kind in arb_kind()) {
            let points = control_chart(&weekly, None, kind);
            for (point, week) in points.iter().zip(&weekly) {
                prop_assert_eq!(&point.week, week);
                prop_assert_eq!(point.value, week.value(kind));
            }
        }
    }
}
