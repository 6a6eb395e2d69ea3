//! Cache-first image fetcher.
//!
//! `ResourceFetcher::fetch` answers from the `CacheStore` when it can and
//! otherwise runs the download on a worker task of the tokio runtime it was
//! built on. The return value says which of the two happened:
//!
//! - `Fetch::Immediate(outcome)`: served from cache; no task was started and
//!   the completion callback is dropped unused.
//! - `Fetch::Deferred(handle)`: a download is running; the callback fires
//!   exactly once with its outcome unless `handle.cancel()` is called first.

use crate::cache::CacheStore;
use crate::cancel::{CancelHandle, CancellationToken};
use crate::config::{NetworkConfig, PipelineConfig};
use crate::decode::{ImageDecoder, ImageHandle, RasterDecoder};
use crate::error::{CellFetchError, ConversionError, ImageError, Result};
use crate::key::ResourceKey;
use crate::network::{HttpClient, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

/// Outcome of one fetch.
pub type FetchOutcome = std::result::Result<ImageHandle, ImageError>;

/// How a fetch was satisfied.
#[derive(Debug)]
pub enum Fetch {
    /// Served from cache; no network operation was started.
    Immediate(FetchOutcome),
    /// A network operation is running; its outcome goes to the callback.
    Deferred(CancelHandle),
}

impl Fetch {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Fetch::Deferred(_))
    }
}

/// Fetches images through the cache, falling back to the transport.
pub struct ResourceFetcher {
    cache: Arc<CacheStore>,
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn ImageDecoder>,
    timeout: Duration,
    runtime: Handle,
}

impl ResourceFetcher {
    pub fn builder() -> ResourceFetcherBuilder {
        ResourceFetcherBuilder::new()
    }

    /// Build a fetcher with the HTTP transport and raster decoder described
    /// by `config`. Must be called from within a tokio runtime.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.cache.validate()?;
        let http = HttpClient::with_config(config.request_timeout, &config.user_agent)?;
        Self::builder()
            .cache(Arc::new(CacheStore::new(&config.cache)))
            .transport(Arc::new(http))
            .timeout(config.request_timeout)
            .build()
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch the image at `url`.
    ///
    /// Never blocks on the network. See the module docs for the meaning of the
    /// returned `Fetch`.
    pub fn fetch<F>(&self, url: impl Into<ResourceKey>, on_complete: F) -> Fetch
    where
        F: FnOnce(FetchOutcome) + Send + 'static,
    {
        let key = url.into();

        if let Some(outcome) = self.lookup_cached(&key) {
            return Fetch::Immediate(outcome);
        }

        Fetch::Deferred(self.spawn_download(key, on_complete))
    }

    /// Callback-only variant of [`fetch`](Self::fetch).
    ///
    /// A cached outcome is handed to `on_complete` on a runtime task, never
    /// on the caller's stack, and `None` is returned since there is nothing to
    /// cancel.
    pub fn fetch_with_callback<F>(
        &self,
        url: impl Into<ResourceKey>,
        on_complete: F,
    ) -> Option<CancelHandle>
    where
        F: FnOnce(FetchOutcome) + Send + 'static,
    {
        let key = url.into();

        if let Some(outcome) = self.lookup_cached(&key) {
            self.runtime.spawn(async move { on_complete(outcome) });
            return None;
        }

        Some(self.spawn_download(key, on_complete))
    }

    fn spawn_download<F>(&self, key: ResourceKey, on_complete: F) -> CancelHandle
    where
        F: FnOnce(FetchOutcome) + Send + 'static,
    {
        debug!("Cache miss for {}, downloading", key);

        let token = CancellationToken::new();
        let worker_token = token.clone();
        let cache = self.cache.clone();
        let transport = self.transport.clone();
        let decoder = self.decoder.clone();
        let timeout = self.timeout;

        let task = self.runtime.spawn(async move {
            let outcome =
                download(&key, transport.as_ref(), decoder.as_ref(), &cache, timeout).await;
            if worker_token.check().is_err() {
                debug!("Fetch for {} cancelled, dropping outcome", key);
                return;
            }
            on_complete(outcome);
        });

        CancelHandle::new(token, task.abort_handle())
    }

    /// Serve `key` from cache if possible.
    ///
    /// A payload that no longer decodes is evicted and reported as
    /// `CachedDataConversion`.
    pub fn lookup_cached(&self, key: &ResourceKey) -> Option<FetchOutcome> {
        let entry = self.cache.lookup(key)?;
        match self.decoder.decode(&entry.payload) {
            Ok(image) => {
                debug!("Serving {} from cache", key);
                Some(Ok(image))
            }
            Err(reason) => {
                self.cache.remove(key);
                debug!("Evicted undecodable cache entry for {}: {}", key, reason);
                Some(Err(ImageError::CachedDataConversion(ConversionError::new(
                    key.as_str(),
                    true,
                    reason,
                ))))
            }
        }
    }
}

async fn download(
    key: &ResourceKey,
    transport: &dyn Transport,
    decoder: &dyn ImageDecoder,
    cache: &CacheStore,
    timeout: Duration,
) -> FetchOutcome {
    let bytes = tokio::time::timeout(timeout, transport.perform_request(key.url(), timeout))
        .await
        .unwrap_or_else(|_| Err(CellFetchError::Timeout(timeout)))
        .map_err(|e| {
            debug!("Download of {} failed: {}", key, e);
            ImageError::from(e)
        })?;

    match decoder.decode(&bytes) {
        Ok(image) => {
            cache.store(key, bytes);
            Ok(image)
        }
        Err(reason) => Err(ImageError::DownloadDataConversion(ConversionError::new(
            key.as_str(),
            false,
            reason,
        ))),
    }
}

/// Builder for [`ResourceFetcher`].
///
/// Every collaborator is injectable; anything left unset gets the production
/// default (persistent cache from `CacheStoreConfig::default()`, reqwest
/// transport, raster decoder, 60 second timeout, the current runtime).
pub struct ResourceFetcherBuilder {
    cache: Option<Arc<CacheStore>>,
    transport: Option<Arc<dyn Transport>>,
    decoder: Arc<dyn ImageDecoder>,
    timeout: Duration,
    runtime: Option<Handle>,
}

impl ResourceFetcherBuilder {
    pub fn new() -> Self {
        Self {
            cache: None,
            transport: None,
            decoder: Arc::new(RasterDecoder),
            timeout: NetworkConfig::REQUEST_TIMEOUT,
            runtime: None,
        }
    }

    pub fn cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Bound on each network request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runtime whose worker pool runs downloads.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<ResourceFetcher> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| CellFetchError::Config {
                message: format!("ResourceFetcher needs a tokio runtime: {}", e),
            })?,
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpClient::with_config(
                self.timeout,
                crate::config::AppConfig::USER_AGENT,
            )?),
        };

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(CacheStore::new(&Default::default())));

        Ok(ResourceFetcher {
            cache,
            transport,
            decoder: self.decoder,
            timeout: self.timeout,
            runtime,
        })
    }
}

impl Default for ResourceFetcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
