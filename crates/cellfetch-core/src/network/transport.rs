//! Pluggable transport used by the fetcher.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use url::Url;

/// Performs one GET request and returns the response body.
///
/// The fetcher runs each call on its own worker task; cancelling a fetch
/// aborts that task, dropping the future returned here. Implementations should
/// treat a non-success HTTP status as an error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform_request(&self, url: &Url, timeout: Duration) -> Result<Bytes>;
}
