use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{error, info};

use crate::api::{ApiError, FitnessDataProvider};
use crate::models::{CollectionRequest, DaySeries, MetricKind};

/// Outcome of a collection run, for the operator-facing summary
#[derive(Debug, Default)]
pub struct CollectionReport {
    pub files_written: usize,
    pub skipped_existing: usize,
    pub empty_days: usize,
    pub last_successful_day: Option<NaiveDate>,
}

/// Sequential per-day collection driver.
///
/// Walks the planned days oldest first, invoking the enabled fetchers one at
/// a time. Vendor failures are fatal; the report captures how far the run got.
pub struct DataCollector<P: FitnessDataProvider> {
    provider: P,
}

impl<P: FitnessDataProvider> DataCollector<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub async fn run(&self, request: &CollectionRequest) -> Result<CollectionReport> {
        let mut report = CollectionReport::default();
        let total_days = request.days.len();

        info!(
            "📅 Collection plan: {} day(s), {} metric type(s), output to {}",
            total_days,
            request.metrics.len(),
            request.output_dir.display()
        );

        for (i, day) in request.days.iter().enumerate() {
            info!("🔄 [{}/{}] Collecting {}", i + 1, total_days, day);

            for metric in &request.metrics {
                let csv_path = request.output_dir.join(metric.csv_file_name(*day));

                // Resume support: a day/metric already on disk costs no request
                if csv_path.exists() {
                    info!("⏭️  {} for {} already collected, skipping", metric, day);
                    report.skipped_existing += 1;
                    continue;
                }

                let fetch = match self.provider.fetch_day(*metric, *day).await {
                    Ok(fetch) => fetch,
                    Err(e) => {
                        self.log_failure(&e, *metric, *day, &report);
                        return Err(anyhow::Error::new(e)
                            .context(format!("Collection failed for {} on {}", metric, day)));
                    }
                };

                if !fetch.series.has_data() {
                    info!("⚪ No {} data for {} (device not worn?)", metric, day);
                    report.empty_days += 1;
                    continue;
                }

                write_day_csv(&csv_path, &fetch.series)?;
                if request.keep_raw {
                    let raw_path = request.output_dir.join(metric.raw_file_name(*day));
                    fs::write(&raw_path, serde_json::to_string_pretty(&fetch.raw)?)
                        .with_context(|| format!("Failed to write {}", raw_path.display()))?;
                }

                info!(
                    "✅ {} for {}: {} samples written to {}",
                    metric,
                    day,
                    fetch.series.samples.len(),
                    csv_path.display()
                );
                report.files_written += 1;
            }

            report.last_successful_day = Some(*day);
        }

        info!(
            "🏁 Collection complete: {} file(s) written, {} skipped as existing, {} empty day(s)",
            report.files_written, report.skipped_existing, report.empty_days
        );

        Ok(report)
    }

    fn log_failure(&self, e: &ApiError, metric: MetricKind, day: NaiveDate, report: &CollectionReport) {
        match e {
            ApiError::RateLimited(_) => match report.last_successful_day {
                Some(last) => error!(
                    "❌ Rate limit hit fetching {} for {}; last fully collected day was {}",
                    metric, day, last
                ),
                None => error!(
                    "❌ Rate limit hit fetching {} for {}; no day completed this run",
                    metric, day
                ),
            },
            _ => error!("❌ Fetching {} for {} failed: {}", metric, day, e),
        }
    }
}

/// Write one per-day series as `Time,<metric column>` rows
fn write_day_csv(path: &Path, series: &DaySeries) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(["Time", series.metric.column_name()])?;
    for sample in &series.samples {
        writer.write_record([sample.time.clone(), sample.value.to_string()])?;
    }
    writer.flush()?;

    Ok(())
}
