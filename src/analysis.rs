use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::models::MetricKind;

/// Descriptive statistics for one metric on one day
#[derive(Debug, Clone, PartialEq)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: i64,
    pub max: i64,
    pub std_dev: f64,
}

/// Reads the per-day CSV files the tracker produced and summarizes them
pub struct AnalysisEngine {
    output_dir: PathBuf,
}

impl AnalysisEngine {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    /// Summarize one metric across the given days. Days without a file are
    /// reported and skipped; an entirely empty selection is an error.
    pub fn summarize(&self, metric: MetricKind, days: &[NaiveDate]) -> Result<Vec<DaySummary>> {
        let mut summaries = Vec::new();
        let mut missing = 0usize;

        for day in days {
            let path = self.output_dir.join(metric.csv_file_name(*day));
            if !path.exists() {
                warn!("No {} file for {}, skipping", metric, day);
                missing += 1;
                continue;
            }

            let values = read_day_values(&path)?;
            if values.is_empty() {
                warn!("{} file for {} holds no samples, skipping", metric, day);
                continue;
            }
            summaries.push(describe(*day, &values));
        }

        if summaries.is_empty() {
            return Err(anyhow!(
                "No matching {} files found in {} for the requested dates",
                metric,
                self.output_dir.display()
            ));
        }

        info!(
            "📊 Summarized {} day(s) of {} data ({} day(s) had no file)",
            summaries.len(),
            metric,
            missing
        );

        Ok(summaries)
    }

    /// Write the summaries back into the output directory as
    /// `summary_<metric prefix>.csv` and return the path.
    pub fn write_summary_csv(
        &self,
        metric: MetricKind,
        summaries: &[DaySummary],
    ) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(format!("summary_{}.csv", metric.file_prefix()));

        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(["Date", "Count", "Mean", "Median", "Min", "Max", "StdDev"])?;
        for s in summaries {
            writer.write_record([
                s.date.format("%Y-%m-%d").to_string(),
                s.count.to_string(),
                format!("{:.2}", s.mean),
                format!("{:.2}", s.median),
                s.min.to_string(),
                s.max.to_string(),
                format!("{:.2}", s.std_dev),
            ])?;
        }
        writer.flush()?;

        Ok(path)
    }
}

/// Render summaries as a fixed-width table for the terminal
pub fn render_table(metric: MetricKind, summaries: &[DaySummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Summary for {} ({} day(s))", metric, summaries.len());
    let _ = writeln!(
        out,
        "{:<12} {:>8} {:>10} {:>10} {:>8} {:>8} {:>10}",
        "Date", "Count", "Mean", "Median", "Min", "Max", "StdDev"
    );
    for s in summaries {
        let _ = writeln!(
            out,
            "{:<12} {:>8} {:>10.2} {:>10.2} {:>8} {:>8} {:>10.2}",
            s.date.format("%Y-%m-%d").to_string(),
            s.count,
            s.mean,
            s.median,
            s.min,
            s.max,
            s.std_dev
        );
    }
    out
}

/// Read the value column of a per-day CSV produced by the tracker
fn read_day_values(path: &Path) -> Result<Vec<i64>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Bad CSV row in {}", path.display()))?;
        let field = record
            .get(1)
            .ok_or_else(|| anyhow!("Row in {} has no value column", path.display()))?;
        let value: i64 = field
            .trim()
            .parse()
            .with_context(|| format!("Non-numeric value '{}' in {}", field, path.display()))?;
        values.push(value);
    }

    Ok(values)
}

/// Plain descriptive statistics; sample standard deviation for n > 1
fn describe(date: NaiveDate, values: &[i64]) -> DaySummary {
    let count = values.len();
    let sum: i64 = values.iter().sum();
    let mean = sum as f64 / count as f64;

    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) as f64 / 2.0
    } else {
        sorted[count / 2] as f64
    };

    let std_dev = if count > 1 {
        let variance = values
            .iter()
            .map(|&v| {
                let diff = v as f64 - mean;
                diff * diff
            })
            .sum::<f64>()
            / (count - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    DaySummary {
        date,
        count,
        mean,
        median,
        min: sorted[0],
        max: sorted[count - 1],
        std_dev,
    }
}
