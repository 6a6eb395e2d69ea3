//! Two-tier cache store: a small fast memory tier in front of a larger
//! persistent tier.

use super::memory::MemoryCache;
use super::sqlite::SqliteCache;
use super::traits::{CacheEntry, CacheStoreStats, CacheTier};
use crate::config::CacheStoreConfig;
use crate::key::ResourceKey;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounded memory + persistent key/value store for fetched payloads.
///
/// Lookups check the memory tier first and fall through to the persistent
/// tier; a persistent hit is promoted into memory. Errors from the persistent
/// tier are logged and treated as a miss, never returned to the caller.
pub struct CacheStore {
    memory: MemoryCache,
    disk: Option<Box<dyn CacheTier>>,
    entry_ttl: Option<Duration>,
}

impl CacheStore {
    /// Build a store from configuration.
    ///
    /// If the persistent tier cannot be opened the store runs memory-only.
    pub fn new(config: &CacheStoreConfig) -> Self {
        let disk: Option<Box<dyn CacheTier>> = if config.disk_capacity_bytes == 0 {
            None
        } else {
            let db_path = config.db_path();
            match SqliteCache::open(&db_path, config.disk_capacity_bytes) {
                Ok(cache) => {
                    info!(
                        "Opened persistent image cache at {} ({} bytes)",
                        db_path.display(),
                        config.disk_capacity_bytes
                    );
                    Some(Box::new(cache))
                }
                Err(e) => {
                    warn!(
                        "Persistent image cache unavailable at {}, continuing memory-only: {}",
                        db_path.display(),
                        e
                    );
                    None
                }
            }
        };

        Self {
            memory: MemoryCache::new(config.memory_capacity_bytes),
            disk,
            entry_ttl: config.entry_ttl,
        }
    }

    /// Memory-only store without expiry.
    pub fn memory_only(capacity_bytes: u64) -> Self {
        Self::new(&CacheStoreConfig::memory_only(capacity_bytes))
    }

    /// Assemble a store from explicit tiers.
    pub fn with_tiers(
        memory: MemoryCache,
        disk: Option<Box<dyn CacheTier>>,
        entry_ttl: Option<Duration>,
    ) -> Self {
        Self {
            memory,
            disk,
            entry_ttl,
        }
    }

    pub fn has_persistent_tier(&self) -> bool {
        self.disk.is_some()
    }

    /// Look up a payload, promoting persistent hits into memory.
    pub fn lookup(&self, key: &ResourceKey) -> Option<CacheEntry> {
        if let Ok(Some(entry)) = self.memory.get(key) {
            debug!("Memory cache hit for {}", key);
            return Some(entry);
        }

        let disk = self.disk.as_ref()?;
        match disk.get(key) {
            Ok(Some(entry)) => {
                debug!("Persistent cache hit for {}, promoting", key);
                let _ = self.memory.put(entry.clone());
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Persistent cache lookup failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Insert or overwrite a payload in both tiers.
    ///
    /// The entry is fully built before either tier sees it.
    pub fn store(&self, key: &ResourceKey, payload: Bytes) {
        let entry = CacheEntry::new(key.clone(), payload, self.entry_ttl);

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.put(entry.clone()) {
                warn!("Persistent cache write failed for {}: {}", key, e);
            }
        }
        let _ = self.memory.put(entry);
    }

    /// Remove a payload from both tiers.
    pub fn remove(&self, key: &ResourceKey) -> bool {
        let mut removed = self.memory.remove(key).unwrap_or(false);
        if let Some(disk) = &self.disk {
            match disk.remove(key) {
                Ok(found) => removed |= found,
                Err(e) => warn!("Persistent cache remove failed for {}: {}", key, e),
            }
        }
        removed
    }

    /// Whether the memory tier currently holds `key`.
    pub fn in_memory(&self, key: &ResourceKey) -> bool {
        self.memory.contains(key)
    }

    pub fn stats(&self) -> CacheStoreStats {
        CacheStoreStats {
            memory: self.memory.stats().unwrap_or_default(),
            disk: self.disk.as_ref().and_then(|disk| match disk.stats() {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!("Persistent cache stats unavailable: {}", e);
                    None
                }
            }),
        }
    }

    pub fn clear(&self) {
        let _ = self.memory.clear();
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.clear() {
                warn!("Persistent cache clear failed: {}", e);
            }
        }
    }
}
