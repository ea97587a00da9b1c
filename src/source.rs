use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::codec::{self, DecodeError};
use crate::model::{TruckTelemetry, ValidationError};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Data source answered HTTP {0}")]
    Status(u16),
    #[error("Malformed response: {0}")]
    Malformed(#[from] DecodeError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Where the producer gets one truck snapshot per poll.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch(&self) -> Result<TruckTelemetry, FetchError>;

    /// Address recorded in the envelope's `api_url`.
    fn address(&self) -> &str;
}

/// Polls an HTTP endpoint returning a single JSON truck record.
pub struct HttpTruckSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpTruckSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("haul-telemetry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl TelemetrySource for HttpTruckSource {
    async fn fetch(&self) -> Result<TruckTelemetry, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok(codec::decode_telemetry(&body)?)
    }

    fn address(&self) -> &str {
        &self.url
    }
}
