//! Delivery of a single payload to the ingestion endpoint
//!
//! The endpoint receives one JSON POST per payload and answers with a JSON
//! acknowledgment whose shape is opaque to the collector.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::error::{Error, Result};
use crate::payload::EventPayload;

/// Sends one payload and returns the parsed acknowledgment
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, payload: &EventPayload) -> Result<serde_json::Value>;
}

/// HTTP transport for the ingestion endpoint
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint_url: String,
}

impl HttpTransport {
    /// Create a transport posting to `endpoint_url`
    ///
    /// The endpoint is expected to be validated already; only client
    /// construction can fail here.
    pub fn new(endpoint_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http_client: build_client(timeout)?,
            endpoint_url: endpoint_url.into(),
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &EventPayload) -> Result<serde_json::Value> {
        let response = self
            .http_client
            .post(&self.endpoint_url)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let ack: serde_json::Value = response
                .json()
                .await
                .map_err(|e| Error::Delivery(format!("failed to parse response: {}", e)))?;
            Ok(ack)
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Delivery(format!(
                "endpoint error ({}): {}",
                status, error_text
            )))
        }
    }
}
