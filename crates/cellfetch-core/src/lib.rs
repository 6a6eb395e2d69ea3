//! Cellfetch - cache-backed, cancelable image fetching for virtualized lists.
//!
//! Rows of a scrolling list are addressed by a volatile `PositionId` while the
//! image they show is addressed by a stable `ResourceKey`. This crate keeps
//! the two apart:
//!
//! - `ResourceFetcher` checks a two-tier `CacheStore` (memory + SQLite) before
//!   going to the network, and hands back a `CancelHandle` for downloads.
//! - `PositionTaskCoordinator` keeps at most one live fetch per position,
//!   cancels fetches for rows that leave the prefetch window, and drops
//!   results for positions that have since asked for something else.
//!
//! # Example
//!
//! ```rust,ignore
//! use cellfetch::{PipelineConfig, PositionId, PositionTaskCoordinator, ResourceFetcher};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cellfetch::Result<()> {
//!     let fetcher = Arc::new(ResourceFetcher::from_config(&PipelineConfig::default())?);
//!     let mut rows = PositionTaskCoordinator::new(fetcher, |delivery: cellfetch::Delivery| {
//!         println!("{} -> {:?}", delivery.position, delivery.outcome.map(|i| i.width()));
//!     });
//!
//!     let url = url::Url::parse("https://example.com/a.png").unwrap();
//!     rows.needs_resource(PositionId::row(0), &url);
//!     while rows.process_next().await {}
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod decode;
pub mod error;
pub mod fetcher;
pub mod key;
pub mod network;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheStore, CacheStoreStats, CacheTier, TierStats};
pub use cancel::{CancelHandle, CancellationToken, CancelledError};
pub use config::{CacheStoreConfig, PipelineConfig};
pub use coordinator::{Delivery, Dispatch, FetchTask, PositionTaskCoordinator, ResultSink, TaskState};
pub use decode::{ImageDecoder, ImageHandle, RasterDecoder};
pub use error::{CellFetchError, ConversionError, ImageError, ImageErrorKind, Result};
pub use fetcher::{Fetch, FetchOutcome, ResourceFetcher, ResourceFetcherBuilder};
pub use key::{PositionId, ResourceKey};
pub use network::{HttpClient, Transport};
