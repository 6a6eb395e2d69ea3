//! Shared helpers for the integration tests.

#![allow(dead_code)]

use cellfetch::{CacheStore, CacheStoreConfig, ResourceFetcher, ResourceKey};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// PNG bytes for a solid-colour square.
pub fn png_bytes(size: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(size, size, Rgba(color));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("Failed to encode test PNG");
    buf.into_inner()
}

pub fn key(url: &str) -> ResourceKey {
    ResourceKey::parse(url).expect("Invalid test URL")
}

#[path = "../../src/testing/transport.rs"]
mod transport;

pub use cellfetch::{CellFetchError, Result, Transport};
pub use transport::ScriptedTransport;

/// Fetcher over `cache` and `transport`. Must be called inside a runtime.
pub fn fetcher(cache: CacheStore, transport: Arc<ScriptedTransport>) -> Arc<ResourceFetcher> {
    Arc::new(
        ResourceFetcher::builder()
            .cache(Arc::new(cache))
            .transport(transport)
            .build()
            .expect("Failed to build fetcher"),
    )
}

/// Fetcher with a small memory-only cache.
pub fn memory_fetcher(transport: Arc<ScriptedTransport>) -> Arc<ResourceFetcher> {
    fetcher(CacheStore::memory_only(1024 * 1024), transport)
}

/// Two-tier cache configuration rooted at `dir`.
pub fn two_tier_config(dir: &Path) -> CacheStoreConfig {
    CacheStoreConfig {
        memory_capacity_bytes: 1024 * 1024,
        disk_capacity_bytes: 4 * 1024 * 1024,
        disk_path: dir.join("imagesDownloadCache"),
        entry_ttl: Some(Duration::from_secs(86_400)),
    }
}
