//! Analysis engine tests over real per-day files

use std::fs;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use test_log::test;

use fitbit_tracker::analysis::AnalysisEngine;
use fitbit_tracker::models::MetricKind;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn write_day_file(dir: &std::path::Path, metric: MetricKind, day: NaiveDate, rows: &[(&str, i64)]) {
    let mut content = format!("Time,{}\n", metric.column_name());
    for (time, value) in rows {
        content.push_str(&format!("{},{}\n", time, value));
    }
    fs::write(dir.join(metric.csv_file_name(day)), content).unwrap();
}

#[test]
fn test_summarize_computes_per_day_stats() {
    let dir = tempdir().unwrap();
    write_day_file(
        dir.path(),
        MetricKind::HeartRate,
        d(2024, 3, 8),
        &[("00:00:00", 60), ("00:00:01", 70), ("00:00:02", 80)],
    );
    write_day_file(
        dir.path(),
        MetricKind::HeartRate,
        d(2024, 3, 9),
        &[("00:00:00", 55), ("00:00:01", 65)],
    );

    let engine = AnalysisEngine::new(dir.path().to_path_buf());
    let summaries = engine
        .summarize(MetricKind::HeartRate, &[d(2024, 3, 8), d(2024, 3, 9)])
        .unwrap();

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].count, 3);
    assert!((summaries[0].mean - 70.0).abs() < f64::EPSILON);
    assert_eq!(summaries[0].min, 60);
    assert_eq!(summaries[0].max, 80);
    assert_eq!(summaries[1].count, 2);
    assert!((summaries[1].median - 60.0).abs() < f64::EPSILON);
}

#[test]
fn test_summarize_skips_missing_days() {
    let dir = tempdir().unwrap();
    write_day_file(
        dir.path(),
        MetricKind::Steps,
        d(2024, 3, 8),
        &[("08:00:00", 120), ("08:15:00", 340)],
    );

    let engine = AnalysisEngine::new(dir.path().to_path_buf());
    let summaries = engine
        .summarize(MetricKind::Steps, &[d(2024, 3, 7), d(2024, 3, 8), d(2024, 3, 9)])
        .unwrap();

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].date, d(2024, 3, 8));
}

#[test]
fn test_summarize_with_no_files_is_an_error() {
    let dir = tempdir().unwrap();
    let engine = AnalysisEngine::new(dir.path().to_path_buf());
    let err = engine
        .summarize(MetricKind::Sleep, &[d(2024, 3, 8)])
        .unwrap_err();
    assert!(err.to_string().contains("No matching"));
}

#[test]
fn test_summary_csv_written_next_to_data() {
    let dir = tempdir().unwrap();
    write_day_file(
        dir.path(),
        MetricKind::Sleep,
        d(2024, 3, 8),
        &[("23:00:30", 1), ("23:01:30", 1), ("23:02:30", 2)],
    );

    let engine = AnalysisEngine::new(dir.path().to_path_buf());
    let summaries = engine.summarize(MetricKind::Sleep, &[d(2024, 3, 8)]).unwrap();
    let path = engine.write_summary_csv(MetricKind::Sleep, &summaries).unwrap();

    assert_eq!(path, dir.path().join("summary_sleep_day.csv"));
    let content = fs::read_to_string(&path).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("Date,Count,Mean,Median,Min,Max,StdDev"));
    let row = lines.next().unwrap();
    assert!(row.starts_with("2024-03-08,3,"));
}
