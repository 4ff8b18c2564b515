//! Out-of-band health signals over HTTP
//!
//! A [`Signal`] delivers a health event somewhere other than the broker,
//! which matters most when the broker itself is the thing that is down.

use crate::health::error::{HealthError, HealthResult};
use crate::health::event::{safe_marshal, HealthEvent};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Canonical signal endpoint
pub const SIGNAL_URL: &str = "https://signal.atsu.io/";

/// Per-request timeout for [`HttpSignal`]
pub const SIGNAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Sink for health events outside the broker
#[async_trait]
pub trait Signal: Send + Sync {
    /// Attach `data` to `event` and send it. An empty map leaves `data` off
    /// the wire.
    async fn report(&self, mut event: HealthEvent, data: Map<String, Value>) -> HealthResult<()> {
        event.data = (!data.is_empty()).then_some(data);
        self.raw_report(safe_marshal(&event)).await
    }

    /// Send an already encoded JSON payload
    async fn raw_report(&self, payload: Vec<u8>) -> HealthResult<()>;
}

/// Signal that POSTs JSON payloads to a fixed URL
#[derive(Clone)]
pub struct HttpSignal {
    client: Client,
    url: String,
}

impl HttpSignal {
    pub fn new(url: impl Into<String>) -> HealthResult<Self> {
        let client = Client::builder()
            .timeout(SIGNAL_TIMEOUT)
            .build()
            .map_err(|e| HealthError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Signal against [`SIGNAL_URL`]
    pub fn canonical() -> HealthResult<Self> {
        Self::new(SIGNAL_URL)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Signal for HttpSignal {
    async fn raw_report(&self, payload: Vec<u8>) -> HealthResult<()> {
        let size = payload.len();
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", concat!("streamkit/", env!("CARGO_PKG_VERSION")))
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HealthError::Signal(format!(
                        "request timed out after {} seconds",
                        SIGNAL_TIMEOUT.as_secs()
                    ))
                } else {
                    HealthError::Signal(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %self.url, status = %status, "Health signal rejected");
            return Err(HealthError::Signal(format!(
                "non-success status {}: {}",
                status,
                if body.is_empty() { "No response body" } else { &body }
            )));
        }

        debug!(url = %self.url, bytes = size, "Health signal sent");
        Ok(())
    }
}
