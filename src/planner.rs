use anyhow::{anyhow, Result};
use chrono::{Duration, NaiveDate};

use crate::api::HOURLY_REQUEST_LIMIT;

/// How the operator described the time window on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateSpec {
    /// Explicit start/end pair; end is exclusive
    Range { start: NaiveDate, end: NaiveDate },
    /// N consecutive days ending at yesterday
    DaysBack(u32),
    /// One specific calendar day
    Single(NaiveDate),
}

/// Resolves a date spec into the ordered list of days a run will fetch,
/// bounded by what the hourly rate limit allows.
pub struct DatePlanner;

impl DatePlanner {
    /// Most days a single run may request for the given metric selection.
    /// Rejects an empty selection before the division.
    pub fn max_days_per_run(metric_count: usize) -> Result<usize> {
        if metric_count == 0 {
            return Err(anyhow!("No metric types selected, nothing to plan"));
        }
        Ok(HOURLY_REQUEST_LIMIT as usize / metric_count)
    }

    /// Resolve the spec into calendar days, oldest first, without applying
    /// the rate-limit cap. `today` is injected so runs near midnight and
    /// tests stay deterministic.
    pub fn resolve(spec: &DateSpec, today: NaiveDate) -> Result<Vec<NaiveDate>> {
        match spec {
            DateSpec::Range { start, end } => {
                if start >= end {
                    return Err(anyhow!(
                        "Start date ({}) must be earlier than end date ({})",
                        start,
                        end
                    ));
                }
                let span = (*end - *start).num_days();
                Ok((0..span).map(|i| *start + Duration::days(i)).collect())
            }
            DateSpec::DaysBack(n) => {
                if *n == 0 {
                    return Err(anyhow!("Number of days needs to be greater than zero"));
                }
                // Today is incomplete, so the window ends at yesterday
                let first = today - Duration::days(i64::from(*n));
                Ok((0..i64::from(*n))
                    .map(|i| first + Duration::days(i))
                    .collect())
            }
            DateSpec::Single(day) => Ok(vec![*day]),
        }
    }

    /// Resolve and enforce the per-run cap derived from the vendor rate
    /// limit. A window that would exceed the cap is rejected outright, never
    /// silently truncated.
    pub fn plan(spec: &DateSpec, metric_count: usize, today: NaiveDate) -> Result<Vec<NaiveDate>> {
        let max_days = Self::max_days_per_run(metric_count)?;
        let days = Self::resolve(spec, today)?;

        if days.len() > max_days {
            return Err(anyhow!(
                "Requested {} days but a single run is limited to {} for {} metric type(s) \
                 ({} requests per hour). Narrow the date range and rerun.",
                days.len(),
                max_days,
                metric_count,
                HOURLY_REQUEST_LIMIT
            ));
        }

        Ok(days)
    }
}
