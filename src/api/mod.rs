use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{DayFetch, MetricKind};

pub mod fitbit_client;
pub use fitbit_client::FitbitClient;

/// Vendor cap on API calls per rolling hour
pub const HOURLY_REQUEST_LIMIT: u32 = 150;

/// Simple pacer that spreads requests evenly under the hourly cap
pub struct RequestPacer {
    delay_ms: u64,
}

impl RequestPacer {
    pub fn new(requests_per_hour: u32) -> Self {
        let delay_ms = if requests_per_hour > 0 {
            3_600_000 / requests_per_hour as u64
        } else {
            1000 // Default 1 second delay
        };

        Self { delay_ms }
    }

    pub async fn wait(&self) {
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
    }
}

/// Vendor HTTP failure classes. All are fatal; they differ only in the
/// operator message and the process exit code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("The request was malformed or rejected by the vendor: {0}")]
    BadRequest(String),
    #[error("The access token is expired or invalid: {0}")]
    Unauthorized(String),
    #[error("The operation is forbidden for this account: {0}")]
    Forbidden(String),
    #[error("The requested resource was not found: {0}")]
    NotFound(String),
    #[error("The vendor rejected a conflicting write: {0}")]
    Conflict(String),
    #[error("The hourly rate limit has been exceeded: {0}")]
    RateLimited(String),
    #[error("The vendor reported a server error: {0}")]
    ServerError(String),
    #[error("Unexpected status {status} from the vendor: {body}")]
    Unexpected { status: u16, body: String },
    #[error("Transport failure talking to the vendor: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("The vendor response did not have the expected shape: {0}")]
    Payload(String),
}

impl ApiError {
    /// Map a non-success HTTP status to its failure class
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 => ApiError::BadRequest(body),
            401 => ApiError::Unauthorized(body),
            403 => ApiError::Forbidden(body),
            404 => ApiError::NotFound(body),
            409 => ApiError::Conflict(body),
            429 => ApiError::RateLimited(body),
            s if s >= 500 => ApiError::ServerError(body),
            s => ApiError::Unexpected { status: s, body },
        }
    }

    /// Distinct non-zero exit code per failure class
    pub fn exit_code(&self) -> i32 {
        match self {
            ApiError::BadRequest(_) => 2,
            ApiError::Unauthorized(_) => 3,
            ApiError::Forbidden(_) => 4,
            ApiError::NotFound(_) => 5,
            ApiError::Conflict(_) => 6,
            ApiError::RateLimited(_) => 7,
            ApiError::ServerError(_) => 8,
            ApiError::Unexpected { .. } => 9,
            ApiError::Transport(_) => 10,
            ApiError::Payload(_) => 11,
        }
    }
}

/// Seam between the collection loop and the vendor client
#[async_trait]
pub trait FitnessDataProvider {
    async fn fetch_day(&self, metric: MetricKind, day: NaiveDate) -> Result<DayFetch, ApiError>;
}
