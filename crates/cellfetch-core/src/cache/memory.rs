//! In-memory LRU tier.
//!
//! Entries live in an unbounded `LruCache`; capacity is enforced in bytes by
//! popping least recently used entries after each insert.

use super::traits::{CacheEntry, CacheTier, TierStats};
use crate::error::Result;
use crate::key::ResourceKey;
use chrono::Utc;
use lru::LruCache;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

struct LruState {
    entries: LruCache<ResourceKey, CacheEntry>,
    size_bytes: u64,
}

impl LruState {
    fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
            size_bytes: 0,
        }
    }

    fn remove(&mut self, key: &ResourceKey) -> Option<CacheEntry> {
        let entry = self.entries.pop(key)?;
        self.size_bytes -= entry.size;
        Some(entry)
    }

    fn evict_to_size(&mut self, max_bytes: u64) -> usize {
        let mut evicted = 0;
        while self.size_bytes > max_bytes {
            let Some((key, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.size_bytes -= entry.size;
            evicted += 1;
            debug!("Evicted {} ({} bytes) from memory tier", key, entry.size);
        }
        evicted
    }
}

/// Bounded in-memory tier with strict LRU eviction.
pub struct MemoryCache {
    capacity_bytes: u64,
    state: Mutex<LruState>,
}

impl MemoryCache {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            capacity_bytes,
            state: Mutex::new(LruState::new()),
        }
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Membership test that does not touch recency.
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.lock().entries.contains(key)
    }

    /// Keys from least to most recently used.
    pub fn keys_by_recency(&self) -> Vec<ResourceKey> {
        self.lock().entries.iter().rev().map(|(key, _)| key.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, LruState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheTier for MemoryCache {
    fn get(&self, key: &ResourceKey) -> Result<Option<CacheEntry>> {
        let mut state = self.lock();

        let expired = match state.entries.peek(key) {
            Some(entry) => entry.is_expired_at(Utc::now()),
            None => return Ok(None),
        };
        if expired {
            state.remove(key);
            debug!("Memory tier entry for {} expired", key);
            return Ok(None);
        }

        Ok(state.entries.get(key).cloned())
    }

    fn put(&self, entry: CacheEntry) -> Result<()> {
        let mut state = self.lock();
        state.remove(&entry.key);

        if entry.size > self.capacity_bytes {
            debug!(
                "Not admitting {} ({} bytes) to memory tier of {} bytes",
                entry.key, entry.size, self.capacity_bytes
            );
            return Ok(());
        }

        state.size_bytes += entry.size;
        state.entries.put(entry.key.clone(), entry);

        state.evict_to_size(self.capacity_bytes);
        Ok(())
    }

    fn remove(&self, key: &ResourceKey) -> Result<bool> {
        Ok(self.lock().remove(key).is_some())
    }

    fn evict_to_size(&self, max_bytes: u64) -> Result<usize> {
        Ok(self.lock().evict_to_size(max_bytes))
    }

    fn stats(&self) -> Result<TierStats> {
        let state = self.lock();
        Ok(TierStats {
            entry_count: state.entries.len(),
            size_bytes: state.size_bytes,
            capacity_bytes: self.capacity_bytes,
        })
    }

    fn clear(&self) -> Result<()> {
        *self.lock() = LruState::new();
        Ok(())
    }
}
