use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::models::{Config, DayFetch, DaySeries, MetricKind, MetricSample, TokenPair, TokenStore};

use super::{ApiError, FitnessDataProvider, RequestPacer};

/// Vendor OAuth token response
#[derive(Debug, Deserialize, Serialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    token_type: String,
}

/// Fitbit API client
pub struct FitbitClient {
    client: Client,
    api_url: String,
    client_id: String,
    client_secret: String,
    tokens: TokenPair,
    token_store: TokenStore,
    pacer: RequestPacer,
}

impl FitbitClient {
    /// Create a new Fitbit client from the loaded configuration
    pub fn new(config: &Config, token_store: TokenStore) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("fitbit-tracker/0.1")
            .build()?;

        let pacer = RequestPacer::new(config.rate_limit_per_hour);

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            tokens: TokenPair::from_config(config),
            token_store,
            pacer,
        })
    }

    /// Build the interactive authorization URL for obtaining the first
    /// token pair (the exchange itself happens on the vendor's tutorial
    /// page, outside this program).
    pub fn authorization_url(config: &Config) -> Result<String> {
        let mut url = Url::parse(&config.auth2_url)?;
        url.query_pairs_mut()
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &config.auth_scopes);

        Ok(url.to_string())
    }

    /// Refresh the token pair up front if it is stale, persisting the new
    /// pair back into the configuration file. Failures during collection are
    /// never retried through this path.
    pub async fn ensure_fresh_token(&mut self) -> Result<()> {
        let now = Utc::now();
        if !self.tokens.needs_refresh(now) {
            if let Some(expires_at) = self.tokens.expires_at {
                let time_left = expires_at - now;
                info!("Tokens valid for {} more minutes", time_left.num_minutes());
            }
            return Ok(());
        }

        warn!("Access token is stale, refreshing");
        let new_tokens = self.refresh_access_token().await?;
        self.token_store.persist(&new_tokens)?;
        self.tokens = new_tokens;
        info!("🔑 Token pair refreshed and saved to {}", self.token_store.path().display());

        Ok(())
    }

    /// Exchange the refresh token for a new pair
    async fn refresh_access_token(&self) -> Result<TokenPair> {
        let auth_header =
            general_purpose::STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));

        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_str(&format!("Basic {}", auth_header))?);

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.tokens.refresh_token.as_str()),
        ];

        self.pacer.wait().await;

        let response = self
            .client
            .post(format!("{}/oauth2/token", self.api_url))
            .headers(headers)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::Error::new(ApiError::from_status(status, error_text))
                .context("Token refresh failed"));
        }

        let token_response: TokenResponse = response.json().await?;

        // 1 minute buffer
        let expires_at = Utc::now() + chrono::Duration::seconds(token_response.expires_in - 60);

        Ok(TokenPair {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            expires_at: Some(expires_at),
        })
    }

    /// Make an authenticated request against the vendor API
    async fn get_json(&self, url: &str) -> Result<Value, ApiError> {
        self.pacer.wait().await;

        debug!("Making request to: {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.tokens.access_token)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, error_text));
        }

        let json: Value = response.json().await?;
        debug!(
            "API response received: {} bytes",
            serde_json::to_string(&json).map(|s| s.len()).unwrap_or(0)
        );

        Ok(json)
    }

    /// Fetch one intraday time series (heart rate or steps) for a single day
    async fn intraday_series(
        &self,
        metric: MetricKind,
        day: NaiveDate,
    ) -> Result<DayFetch, ApiError> {
        let resource = metric
            .resource()
            .ok_or_else(|| ApiError::Payload(format!("{} has no intraday resource", metric)))?;
        let detail = metric
            .detail_level()
            .ok_or_else(|| ApiError::Payload(format!("{} has no detail level", metric)))?;

        let url = format!(
            "{}/1/user/-/{}/date/{}/1d/{}/time/00:00/23:59.json",
            self.api_url,
            resource,
            day.format("%Y-%m-%d"),
            detail
        );

        let raw = self.get_json(&url).await?;
        let samples = flatten_intraday(&raw, resource)?;
        debug!("Retrieved {} {} samples for {}", samples.len(), metric, day);

        Ok(DayFetch {
            series: DaySeries { metric, date: day, samples },
            raw,
        })
    }

    /// Fetch the sleep log for a single day
    async fn sleep_log(&self, day: NaiveDate) -> Result<DayFetch, ApiError> {
        let url = format!("{}/1/user/-/sleep/date/{}.json", self.api_url, day.format("%Y-%m-%d"));

        let raw = self.get_json(&url).await?;
        let samples = flatten_sleep(&raw)?;
        debug!("Retrieved {} sleep minutes for {}", samples.len(), day);

        Ok(DayFetch {
            series: DaySeries { metric: MetricKind::Sleep, date: day, samples },
            raw,
        })
    }
}

#[async_trait]
impl FitnessDataProvider for FitbitClient {
    async fn fetch_day(&self, metric: MetricKind, day: NaiveDate) -> Result<DayFetch, ApiError> {
        match metric {
            MetricKind::HeartRate | MetricKind::Steps => self.intraday_series(metric, day).await,
            MetricKind::Sleep => self.sleep_log(day).await,
        }
    }
}

/// Flatten `{"activities-heart-intraday": {"dataset": [{"time", "value"}]}}`
/// into timestamped samples. The wrapper key follows the resource name with
/// slashes replaced by dashes.
fn flatten_intraday(raw: &Value, resource: &str) -> Result<Vec<MetricSample>, ApiError> {
    let key = format!("{}-intraday", resource.replace('/', "-"));

    let dataset = raw
        .get(&key)
        .and_then(|v| v.get("dataset"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| ApiError::Payload(format!("Missing {}.dataset in response", key)))?;

    let mut samples = Vec::with_capacity(dataset.len());
    for entry in dataset {
        let time = entry
            .get("time")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError::Payload(format!("Sample in {} has no time field", key)))?;
        let value = numeric_value(entry.get("value"))
            .ok_or_else(|| ApiError::Payload(format!("Sample in {} has no value field", key)))?;

        samples.push(MetricSample { time: time.to_string(), value });
    }

    Ok(samples)
}

/// Flatten the first sleep log's `minuteData` (1=asleep, 2=restless,
/// 3=awake). An empty `sleep` array is a valid no-data day.
fn flatten_sleep(raw: &Value) -> Result<Vec<MetricSample>, ApiError> {
    let logs = raw
        .get("sleep")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ApiError::Payload("Missing sleep array in response".to_string()))?;

    let Some(first) = logs.first() else {
        return Ok(Vec::new());
    };

    let minute_data = first
        .get("minuteData")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ApiError::Payload("Sleep log has no minuteData".to_string()))?;

    let mut samples = Vec::with_capacity(minute_data.len());
    for entry in minute_data {
        let time = entry
            .get("dateTime")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError::Payload("Sleep minute has no dateTime field".to_string()))?;
        let value = numeric_value(entry.get("value"))
            .ok_or_else(|| ApiError::Payload("Sleep minute has no value field".to_string()))?;

        samples.push(MetricSample { time: time.to_string(), value });
    }

    Ok(samples)
}

/// Vendor payloads carry values as numbers or as quoted numbers
fn numeric_value(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
