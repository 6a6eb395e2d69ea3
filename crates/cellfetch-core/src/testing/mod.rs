//! Test doubles shared by the unit tests.

#[allow(dead_code)]
mod transport;

use crate::cache::CacheStore;
use crate::fetcher::ResourceFetcher;
use std::sync::Arc;

pub(crate) use crate::decode::tests::png_bytes;
pub(crate) use crate::error::{CellFetchError, Result};
pub(crate) use crate::network::Transport;
pub(crate) use transport::ScriptedTransport;

/// Fetcher over a memory-only cache and the given transport.
pub(crate) fn fetcher_with(transport: Arc<ScriptedTransport>) -> Arc<ResourceFetcher> {
    Arc::new(
        ResourceFetcher::builder()
            .cache(Arc::new(CacheStore::memory_only(1024 * 1024)))
            .transport(transport)
            .build()
            .unwrap(),
    )
}
