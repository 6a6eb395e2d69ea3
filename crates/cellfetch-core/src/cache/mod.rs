//! Bounded two-tier cache for fetched payloads.
//!
//! - `MemoryCache`: small, fast, in-process LRU tier
//! - `SqliteCache`: larger persistent LRU tier in a single SQLite database
//! - `CacheStore`: the two combined, with fall-through and promotion
//!
//! Both tiers evict by strict LRU on a monotonic access counter, so eviction
//! order is a function of the operation sequence alone.

mod memory;
mod sqlite;
mod store;
mod traits;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
pub use store::CacheStore;
pub use traits::{expiry_after, CacheEntry, CacheStoreStats, CacheTier, TierStats};
