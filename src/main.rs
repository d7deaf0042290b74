use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fitbit_tracker::api::{ApiError, FitbitClient};
use fitbit_tracker::data_collector::DataCollector;
use fitbit_tracker::models::{CollectionRequest, Config, MetricKind, TokenStore};
use fitbit_tracker::planner::{DatePlanner, DateSpec};

/// Fitbit data collector
#[derive(Parser)]
#[command(name = "fitbit-tracker")]
#[command(version)]
#[command(about = "Retrieves heart rate, step and sleep data from the Fitbit web API \
and stores one CSV per metric per day")]
#[command(long_about = "
Authenticates against the Fitbit OAuth2 API with the credentials in the given
configuration file, pulls the selected metrics for the planned days and writes
one CSV per metric per day into the output directory. Days already on disk
are skipped, so interrupted runs can simply be restarted.

To collect data over long periods of time, trigger this once a day from cron;
by default each run collects yesterday.

Examples:
  fitbit-tracker fitbit-config.json -a
  fitbit-tracker fitbit-config.json -t heartrate -t sleep --days 7
  fitbit-tracker fitbit-config.json -a -s 2024-03-01 -e 2024-03-15 --keep-raw
")]
struct Args {
    /// Name of the configuration file
    config: PathBuf,

    /// Collect all the data types possible
    #[arg(short = 'a', long = "all", conflicts_with = "metric_types")]
    all: bool,

    /// Collect only the type of data specified (heartrate, steps, sleep)
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    metric_types: Vec<String>,

    /// Start date to collect data from (YYYY-MM-DD), paired with --end-date
    #[arg(short = 's', long, requires = "end_date", conflicts_with_all = ["days", "date"])]
    start_date: Option<NaiveDate>,

    /// End date to collect data to (YYYY-MM-DD, exclusive)
    #[arg(short = 'e', long, requires = "start_date", conflicts_with_all = ["days", "date"])]
    end_date: Option<NaiveDate>,

    /// Number of days to go back, ending at yesterday
    #[arg(long, conflicts_with = "date")]
    days: Option<u32>,

    /// Specific date to collect for (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Output directory to store results files
    #[arg(short = 'o', long = "output", default_value = "results")]
    output_dir: PathBuf,

    /// Set the logging level [debug info warn error]
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,

    /// Set the logfile name
    #[arg(short = 'l', long = "log-file", default_value = "fitbit-tracker.log")]
    log_file: PathBuf,

    /// Also keep the raw JSON responses next to the CSV files
    #[arg(long)]
    keep_raw: bool,
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

/// Resolve the metric selection flags, rejecting duplicates and requiring
/// either an explicit list or --all
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
            "You need to specify the type of data to collect (-t) or use the -a flag"
        ));
    }

    Ok(metrics)
}

fn resolve_date_spec(args: &Args) -> Result<DateSpec> {
    match (args.start_date, args.end_date, args.days, args.date) {
        (Some(start), Some(end), None, None) => Ok(DateSpec::Range { start, end }),
        (None, None, Some(n), None) => Ok(DateSpec::DaysBack(n)),
        (None, None, None, Some(day)) => Ok(DateSpec::Single(day)),
        // Today is never complete, so the default is yesterday
        (None, None, None, None) => Ok(DateSpec::DaysBack(1)),
        _ => Err(anyhow!(
            "Illegal date specification: use --start-date with --end-date, or --days, or --date"
        )),
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(&args.log_level, &args.log_file)?;

    info!("🚀 Starting fitbit-tracker");

    let metrics = resolve_metrics(args.all, &args.metric_types)?;
    let spec = resolve_date_spec(&args)?;

    if !args.output_dir.is_dir() {
        return Err(anyhow!(
            "Output directory does not exist: {}",
            args.output_dir.display()
        ));
    }

    let config = Config::load(&args.config)?;
    if let Err(e) = config.validate_tokens() {
        if let Ok(url) = FitbitClient::authorization_url(&config) {
            eprintln!("Authorize the application and obtain a token pair at:");
            eprintln!("  {}", url);
        }
        return Err(e);
    }
    info!("📋 Configuration loaded from {}", args.config.display());

    let today = Utc::now().date_naive();
    let days = DatePlanner::plan(&spec, metrics.len(), today)?;
    info!(
        "📅 Planned {} day(s): {} to {}",
        days.len(),
        days.first().map(|d| d.to_string()).unwrap_or_default(),
        days.last().map(|d| d.to_string()).unwrap_or_default()
    );

    let token_store = TokenStore::new(args.config.clone());
    let mut client = FitbitClient::new(&config, token_store)?;
    client.ensure_fresh_token().await?;

    let request = CollectionRequest {
        metrics,
        days,
        output_dir: args.output_dir.clone(),
        keep_raw: args.keep_raw,
    };

    let collector = DataCollector::new(client);
    let report = collector.run(&request).await?;

    println!(
        "✅ Collection finished: {} file(s) written, {} already present, {} day(s) without data",
        report.files_written, report.skipped_existing, report.empty_days
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        // Vendor failures carry a per-class exit code, everything else is 1
        let code = e
            .downcast_ref::<ApiError>()
            .map_or(1, ApiError::exit_code);
        error!("{:#}", e);
        eprintln!("❌ {:#}", e);
        process::exit(code);
    }
}
