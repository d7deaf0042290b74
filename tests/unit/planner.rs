//! Date-range planner tests

use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;
use test_log::test;

use fitbit_tracker::planner::{DatePlanner, DateSpec};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[test]
fn test_day_counts_end_at_yesterday() {
    let today = d(2024, 3, 10);

    for n in 1u32..=10 {
        let days = DatePlanner::resolve(&DateSpec::DaysBack(n), today).unwrap();

        assert_eq!(days.len(), n as usize);
        assert_eq!(days.last().copied(), Some(today - Duration::days(1)));
        for pair in days.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::days(1));
        }
    }
}

#[test]
fn test_day_count_crossing_month_boundary() {
    let today = d(2024, 3, 2);
    let days = DatePlanner::resolve(&DateSpec::DaysBack(4), today).unwrap();
    assert_eq!(
        days,
        vec![d(2024, 2, 27), d(2024, 2, 28), d(2024, 2, 29), d(2024, 3, 1)]
    );
}

#[test]
fn test_explicit_range_length_and_order() {
    let today = d(2024, 6, 1);
    let start = d(2024, 4, 10);
    let end = d(2024, 4, 25);

    let days = DatePlanner::resolve(&DateSpec::Range { start, end }, today).unwrap();

    assert_eq!(days.len(), (end - start).num_days() as usize);
    assert_eq!(days.first().copied(), Some(start));
    assert_eq!(days.last().copied(), Some(end - Duration::days(1)));
    assert!(days.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_single_date_plans_one_day() {
    let today = d(2024, 6, 1);
    let days = DatePlanner::plan(&DateSpec::Single(d(2024, 5, 20)), 3, today).unwrap();
    assert_eq!(days, vec![d(2024, 5, 20)]);
}

#[test]
fn test_cap_is_rate_limit_over_metric_count() {
    // 150 requests per hour split across the selected metric types
    assert_eq!(DatePlanner::max_days_per_run(1).unwrap(), 150);
    assert_eq!(DatePlanner::max_days_per_run(2).unwrap(), 75);
    assert_eq!(DatePlanner::max_days_per_run(3).unwrap(), 50);
}

#[test]
fn test_zero_metrics_rejected_before_division() {
    assert!(DatePlanner::max_days_per_run(0).is_err());

    let today = d(2024, 6, 1);
    let err = DatePlanner::plan(&DateSpec::DaysBack(1), 0, today).unwrap_err();
    assert!(err.to_string().contains("No metric types selected"));
}

#[test]
fn test_over_cap_range_is_rejected() {
    let today = d(2024, 6, 1);
    // 60 days with 3 metrics exceeds floor(150 / 3) = 50
    let spec = DateSpec::Range { start: d(2024, 1, 1), end: d(2024, 3, 1) };

    let err = DatePlanner::plan(&spec, 3, today).unwrap_err();
    assert!(err.to_string().contains("limited to 50"));

    // The same window is fine with a single metric
    assert_eq!(DatePlanner::plan(&spec, 1, today).unwrap().len(), 60);
}

#[test]
fn test_exactly_at_cap_is_accepted() {
    let today = d(2024, 6, 1);
    let spec = DateSpec::Range { start: d(2024, 1, 1), end: d(2024, 2, 20) }; // 50 days
    assert_eq!(DatePlanner::plan(&spec, 3, today).unwrap().len(), 50);
}

#[test]
fn test_invalid_specs_rejected() {
    let today = d(2024, 6, 1);

    assert!(DatePlanner::resolve(&DateSpec::DaysBack(0), today).is_err());

    let inverted = DateSpec::Range { start: d(2024, 5, 2), end: d(2024, 5, 1) };
    assert!(DatePlanner::resolve(&inverted, today).is_err());

    let empty = DateSpec::Range { start: d(2024, 5, 1), end: d(2024, 5, 1) };
    assert!(DatePlanner::resolve(&empty, today).is_err());
}
