//! Cache tier trait and types.

use crate::error::Result;
use crate::key::ResourceKey;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// A cached payload with metadata.
///
/// Entries are immutable once built; overwriting a key replaces the entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: ResourceKey,
    /// The raw payload as fetched from the network.
    pub payload: Bytes,
    /// Size of the payload in bytes.
    pub size: u64,
    /// When the entry was stored.
    pub stored_at: DateTime<Utc>,
    /// When the entry expires, if it does.
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn new(key: ResourceKey, payload: Bytes, ttl: Option<Duration>) -> Self {
        let stored_at = Utc::now();
        let expires_at = ttl.and_then(|ttl| expiry_after(stored_at, ttl));
        Self {
            key,
            size: payload.len() as u64,
            payload,
            stored_at,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// `start + ttl`, or `None` when that instant is not representable.
///
/// An unrepresentable expiry means the entry never expires.
pub fn expiry_after(start: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| start.checked_add_signed(ttl))
}

/// Resident size of a single tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierStats {
    pub entry_count: usize,
    pub size_bytes: u64,
    pub capacity_bytes: u64,
}

/// Statistics across both tiers of a `CacheStore`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStoreStats {
    pub memory: TierStats,
    /// `None` when the store runs without a persistent tier.
    pub disk: Option<TierStats>,
}

/// One bounded tier of the cache.
///
/// Tiers are keyed by `ResourceKey`, bounded by a byte capacity, and evict
/// least recently used entries first. Implementations must be safe to call
/// from several worker tasks at once.
pub trait CacheTier: Send + Sync {
    /// Get an entry, bumping its recency. Expired entries are removed and
    /// reported as a miss.
    fn get(&self, key: &ResourceKey) -> Result<Option<CacheEntry>>;

    /// Insert or overwrite an entry, then evict down to capacity.
    ///
    /// An entry larger than the whole capacity is not admitted.
    fn put(&self, entry: CacheEntry) -> Result<()>;

    /// Remove an entry. Returns whether one was present.
    fn remove(&self, key: &ResourceKey) -> Result<bool>;

    /// Evict least recently used entries until resident size is within
    /// `max_bytes`. Returns the number of entries evicted.
    fn evict_to_size(&self, max_bytes: u64) -> Result<usize>;

    fn stats(&self) -> Result<TierStats>;

    fn clear(&self) -> Result<()>;
}
