use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metric types the tracker knows how to collect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    HeartRate,
    Steps,
    Sleep,
}

impl MetricKind {
    /// All supported metrics, in collection order
    pub fn all() -> Vec<MetricKind> {
        vec![MetricKind::HeartRate, MetricKind::Steps, MetricKind::Sleep]
    }

    /// Intraday resource path on the vendor API (sleep uses its own endpoint)
    pub fn resource(&self) -> Option<&'static str> {
        match self {
            MetricKind::HeartRate => Some("activities/heart"),
            MetricKind::Steps => Some("activities/steps"),
            MetricKind::Sleep => None,
        }
    }

    /// Sampling granularity requested for the intraday series
    pub fn detail_level(&self) -> Option<&'static str> {
        match self {
            MetricKind::HeartRate => Some("1sec"),
            MetricKind::Steps => Some("15min"),
            MetricKind::Sleep => None,
        }
    }

    /// Column header used in the per-day CSV
    pub fn column_name(&self) -> &'static str {
        match self {
            MetricKind::HeartRate => "Heart Rate",
            MetricKind::Steps => "Steps",
            MetricKind::Sleep => "Sleep Type",
        }
    }

    /// Filename stem shared by the CSV and the optional raw JSON
    pub fn file_prefix(&self) -> &'static str {
        match self {
            MetricKind::HeartRate => "hr_intraday",
            MetricKind::Steps => "steps_intraday",
            MetricKind::Sleep => "sleep_day",
        }
    }

    pub fn csv_file_name(&self, day: NaiveDate) -> String {
        format!("{}_{}.csv", self.file_prefix(), day.format("%Y-%m-%d"))
    }

    pub fn raw_file_name(&self, day: NaiveDate) -> String {
        format!("{}_{}.json", self.file_prefix(), day.format("%Y-%m-%d"))
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::HeartRate => "heartrate",
            MetricKind::Steps => "steps",
            MetricKind::Sleep => "sleep",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for MetricKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "heartrate" | "heart" | "hr" => Ok(MetricKind::HeartRate),
            "steps" | "step" => Ok(MetricKind::Steps),
            "sleep" => Ok(MetricKind::Sleep),
            other => Err(anyhow!(
                "Unknown metric type '{}' (expected heartrate, steps or sleep)",
                other
            )),
        }
    }
}

/// One timestamped sample inside a single calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub time: String,
    pub value: i64,
}

/// Flattened per-day series for one metric
#[derive(Debug, Clone)]
pub struct DaySeries {
    pub metric: MetricKind,
    pub date: NaiveDate,
    pub samples: Vec<MetricSample>,
}

impl DaySeries {
    pub fn total(&self) -> i64 {
        self.samples.iter().map(|s| s.value).sum()
    }

    /// A day the device was not worn comes back empty or all zero; that is
    /// "no data", not a failure.
    pub fn has_data(&self) -> bool {
        !self.samples.is_empty() && self.total() > 0
    }
}

/// A fetched day: the flattened series plus the raw vendor payload
#[derive(Debug, Clone)]
pub struct DayFetch {
    pub series: DaySeries,
    pub raw: Value,
}

/// A fully resolved collection run
#[derive(Debug, Clone)]
pub struct CollectionRequest {
    pub metrics: Vec<MetricKind>,
    pub days: Vec<NaiveDate>,
    pub output_dir: PathBuf,
    pub keep_raw: bool,
}

fn default_rate_limit_per_hour() -> u32 {
    150
}

/// Configuration loaded from the JSON file passed on the command line.
///
/// The token fields are rewritten in place by the token store whenever the
/// vendor hands out a fresh pair; everything else is operator-owned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub base_url: String,
    pub api_url: String,
    pub auth2_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_scopes: String,
    pub redirect_url: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_expires: String,
    #[serde(default = "default_rate_limit_per_hour")]
    pub rate_limit_per_hour: u32,
}

impl Config {
    /// Load the configuration file. Fatal: missing file, bad JSON, or a
    /// missing client id/secret pair.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow!(
                "Configuration file does not exist: {}",
                path.display()
            ));
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))?;

        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(anyhow!("Client id and secret must both be set"));
        }

        Ok(config)
    }

    /// Checked separately from `load` so the caller can still build the
    /// interactive authorization URL when the token pair is missing.
    pub fn validate_tokens(&self) -> Result<()> {
        if self.access_token.is_empty() {
            return Err(anyhow!(
                "No access token found. Please generate one and place it in the configuration file."
            ));
        }
        if self.refresh_token.is_empty() {
            return Err(anyhow!(
                "No refresh token found. Please generate one and place it in the configuration file."
            ));
        }
        Ok(())
    }
}

/// Current OAuth2 token pair
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    pub fn from_config(config: &Config) -> Self {
        let expires_at = DateTime::parse_from_rfc3339(&config.token_expires)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));

        TokenPair {
            access_token: config.access_token.clone(),
            refresh_token: config.refresh_token.clone(),
            expires_at,
        }
    }

    /// An unknown expiry counts as stale so the pair gets refreshed up front.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now + chrono::Duration::minutes(5),
            None => true,
        }
    }
}

/// Rewrites the token fields of the configuration file in place.
///
/// The file path is an explicit parameter here rather than ambient state, so
/// one run touches exactly one file and tests can point it anywhere.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        TokenStore { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically rewrite `access_token`, `refresh_token` and `token_expires`
    /// while leaving every other field untouched.
    pub fn persist(&self, tokens: &TokenPair) -> Result<()> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read configuration file {}", self.path.display()))?;
        let mut doc: serde_json::Map<String, Value> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file {}", self.path.display()))?;

        doc.insert(
            "access_token".to_string(),
            Value::String(tokens.access_token.clone()),
        );
        doc.insert(
            "refresh_token".to_string(),
            Value::String(tokens.refresh_token.clone()),
        );
        doc.insert(
            "token_expires".to_string(),
            Value::String(
                tokens
                    .expires_at
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_default(),
            ),
        );

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(&doc)?)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        Ok(())
    }
}
