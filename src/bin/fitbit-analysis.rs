use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fitbit_tracker::analysis::{render_table, AnalysisEngine};
use fitbit_tracker::models::MetricKind;
use fitbit_tracker::planner::{DatePlanner, DateSpec};

/// Analytics over data generated by fitbit-tracker
#[derive(Parser)]
#[command(name = "fitbit-analysis")]
#[command(version)]
#[command(about = "Analyze the per-day CSV files generated by fitbit-tracker")]
#[command(long_about = "
Reads the per-day CSV files fitbit-tracker wrote into the output directory
and produces descriptive statistics (count, mean, median, min, max, standard
deviation) per metric per day, plus a summary CSV alongside the data.

Examples:
  fitbit-analysis -a --days 7
  fitbit-analysis -t heartrate -s 2024-03-01 -e 2024-03-15 -o results
")]
struct Args {
    /// Analyze all the data types possible
    #[arg(short = 'a', long = "all", conflicts_with = "metric_types")]
    all: bool,

    /// Analyze only the type of data specified (heartrate, steps, sleep)
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    metric_types: Vec<String>,

    /// Start date to analyze data from (YYYY-MM-DD), paired with --end-date
    #[arg(short = 's', long, requires = "end_date", conflicts_with_all = ["days", "date"])]
    start_date: Option<NaiveDate>,

    /// End date to analyze data to (YYYY-MM-DD, exclusive)
    #[arg(short = 'e', long, requires = "start_date", conflicts_with_all = ["days", "date"])]
    end_date: Option<NaiveDate>,

    /// Number of days to go back and analyze, ending at yesterday
    #[arg(long, conflicts_with = "date")]
    days: Option<u32>,

    /// Specific date to analyze (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Directory holding the results files
    #[arg(short = 'o', long = "output", default_value = "results")]
    output_dir: PathBuf,

    /// Set the logging level [debug info warn error]
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,

    /// Set the logfile name
    #[arg(short = 'l', long = "log-file", default_value = "fitbit-analysis.log")]
    log_file: PathBuf,
}

fn init_logging(log_level: &str, log_file: &Path) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        other => {
            return Err(anyhow!(
                "Invalid log level '{}' (expected debug, info, warn or error)",
                other
            ))
        }
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| anyhow!("Cannot open log file {}: {}", log_file.display(), e))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!(
            "fitbit_tracker={level},fitbit_analysis={level}"
        )))
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    Ok(())
}

fn resolve_metrics(all: bool, metric_types: &[String]) -> Result<Vec<MetricKind>> {
    if all {
        return Ok(MetricKind::all());
    }

    let mut metrics: Vec<MetricKind> = Vec::new();
    for raw in metric_types {
        let metric: MetricKind = raw.parse()?;
        if !metrics.contains(&metric) {
            metrics.push(metric);
        }
    }

    if metrics.is_empty() {
        return Err(anyhow!(
            "You need to specify the type of data to analyze (-t) or use the -a flag"
        ));
    }

    Ok(metrics)
}

fn resolve_date_spec(args: &Args) -> Result<DateSpec> {
    match (args.start_date, args.end_date, args.days, args.date) {
        (Some(start), Some(end), None, None) => Ok(DateSpec::Range { start, end }),
        (None, None, Some(n), None) => Ok(DateSpec::DaysBack(n)),
        (None, None, None, Some(day)) => Ok(DateSpec::Single(day)),
        (None, None, None, None) => Err(anyhow!(
            "No date specified: use --start-date with --end-date, or --days, or --date"
        )),
        _ => Err(anyhow!(
            "Illegal date specification: use --start-date with --end-date, or --days, or --date"
        )),
    }
}

fn run(args: Args) -> Result<()> {
    init_logging(&args.log_level, &args.log_file)?;

    let metrics = resolve_metrics(args.all, &args.metric_types)?;
    let spec = resolve_date_spec(&args)?;

    if !args.output_dir.is_dir() {
        return Err(anyhow!(
            "Output directory does not exist: {}",
            args.output_dir.display()
        ));
    }

    // Analysis only reads local files, so the rate-limit cap does not apply
    let today = Utc::now().date_naive();
    let days = DatePlanner::resolve(&spec, today)?;
    info!("📅 Analyzing {} day(s) of {} metric type(s)", days.len(), metrics.len());

    let engine = AnalysisEngine::new(args.output_dir.clone());
    for metric in metrics {
        let summaries = engine.summarize(metric, &days)?;
        print!("{}", render_table(metric, &summaries));

        let summary_path = engine.write_summary_csv(metric, &summaries)?;
        println!("Summary written to {}\n", summary_path.display());
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        error!("{:#}", e);
        eprintln!("❌ {:#}", e);
        process::exit(1);
    }
}
