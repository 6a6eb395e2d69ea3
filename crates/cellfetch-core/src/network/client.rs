//! HTTP client backed by reqwest.
//!
//! Provides a thin wrapper around reqwest with:
//! - A default request timeout, overridable per request
//! - User-agent management
//! - Mapping of non-success statuses and timeouts onto `CellFetchError`

use super::transport::Transport;
use crate::config::{AppConfig, NetworkConfig};
use crate::{CellFetchError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP client used as the production `Transport`.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    /// Default timeout for requests.
    default_timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(NetworkConfig::REQUEST_TIMEOUT, AppConfig::USER_AGENT)
    }

    /// Create a new HTTP client with a custom default timeout and user agent.
    pub fn with_config(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| CellFetchError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// GET `url` and return the full body.
    pub async fn get_bytes(&self, url: &Url, timeout: Duration) -> Result<Bytes> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                CellFetchError::Timeout(timeout)
            } else {
                CellFetchError::Network {
                    message: format!("GET {} failed: {}", url, e),
                    source: Some(e),
                }
            }
        };

        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(map_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CellFetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(map_err)?;
        debug!("GET {} -> {} bytes", url, body.len());
        Ok(body)
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn perform_request(&self, url: &Url, timeout: Duration) -> Result<Bytes> {
        self.get_bytes(url, timeout).await
    }
}
