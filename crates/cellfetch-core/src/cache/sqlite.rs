//! SQLite-based persistent cache tier.

use super::traits::{CacheEntry, CacheTier, TierStats};
use crate::error::{CellFetchError, Result};
use crate::key::ResourceKey;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

struct SqliteState {
    conn: Connection,
    /// Last access tick handed out; persisted through `last_accessed`.
    tick: i64,
}

impl SqliteState {
    fn next_tick(&mut self) -> i64 {
        self.tick += 1;
        self.tick
    }
}

/// SQLite-based persistent tier.
///
/// One table keyed by URL. Recency is an integer tick stored per row so the
/// LRU order survives restarts. Thread-safe via internal mutex on the
/// connection.
pub struct SqliteCache {
    state: Mutex<SqliteState>,
    capacity_bytes: u64,
}

impl SqliteCache {
    /// Open (or create) the tier at `db_path`.
    pub fn open(db_path: impl AsRef<Path>, capacity_bytes: u64) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CellFetchError::Io {
                message: format!("Failed to create cache directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| CellFetchError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| CellFetchError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::init_schema(&conn)?;

        let tick: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(last_accessed), 0) FROM cache_entries",
                [],
                |row| row.get(0),
            )
            .map_err(|e| CellFetchError::Database {
                message: format!("Failed to read access counter: {}", e),
                source: Some(e),
            })?;

        let cache = Self {
            state: Mutex::new(SqliteState { conn, tick }),
            capacity_bytes,
        };

        // The capacity may have shrunk since the database was written.
        cache.evict_to_size(capacity_bytes)?;

        Ok(cache)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                size_bytes INTEGER NOT NULL,
                stored_at TEXT NOT NULL,
                expires_at TEXT,
                last_accessed INTEGER NOT NULL
            );

            -- Index for LRU eviction
            CREATE INDEX IF NOT EXISTS idx_cache_accessed
                ON cache_entries(last_accessed);
            "#,
        )
        .map_err(|e| CellFetchError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    fn lock(&self) -> Result<MutexGuard<'_, SqliteState>> {
        self.state.lock().map_err(|e| CellFetchError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    fn delete(conn: &Connection, key: &str) -> Result<usize> {
        conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            .map_err(|e| CellFetchError::Database {
                message: format!("Failed to delete cache entry: {}", e),
                source: Some(e),
            })
    }

    fn total_size(conn: &Connection) -> Result<u64> {
        let size: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries",
                [],
                |row| row.get(0),
            )
            .map_err(|e| CellFetchError::Database {
                message: format!("Failed to query cache size: {}", e),
                source: Some(e),
            })?;
        Ok(size as u64)
    }

    fn evict_locked(conn: &Connection, max_bytes: u64) -> Result<usize> {
        let current_size = Self::total_size(conn)?;
        if current_size <= max_bytes {
            return Ok(0);
        }

        let excess = current_size - max_bytes;

        // Get entries ordered by last_accessed (LRU)
        let mut stmt = conn
            .prepare("SELECT key, size_bytes FROM cache_entries ORDER BY last_accessed ASC")
            .map_err(|e| CellFetchError::Database {
                message: format!("Failed to prepare eviction query: {}", e),
                source: Some(e),
            })?;

        let entries = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| CellFetchError::Database {
                message: format!("Failed to read eviction candidates: {}", e),
                source: Some(e),
            })?;

        drop(stmt);

        let mut evicted_bytes = 0u64;
        let mut evicted_count = 0;

        for (key, size) in entries {
            if evicted_bytes >= excess {
                break;
            }
            Self::delete(conn, &key)?;
            evicted_bytes += size as u64;
            evicted_count += 1;
        }

        debug!(
            "Evicted {} entries ({} bytes) from persistent tier",
            evicted_count, evicted_bytes
        );

        Ok(evicted_count)
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl CacheTier for SqliteCache {
    fn get(&self, key: &ResourceKey) -> Result<Option<CacheEntry>> {
        let mut state = self.lock()?;

        let row: Option<(Vec<u8>, i64, String, Option<String>)> = state
            .conn
            .query_row(
                r#"
                SELECT value, size_bytes, stored_at, expires_at
                FROM cache_entries
                WHERE key = ?1
                "#,
                params![key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| CellFetchError::Database {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        let (value, size_bytes, stored_at_str, expires_at_str) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let stored_at = parse_timestamp(&stored_at_str);
        // Outer None means the column held an unparseable timestamp.
        let expires_at = match expires_at_str.as_deref() {
            Some(s) => parse_timestamp(s).map(Some),
            None => Some(None),
        };

        let (stored_at, expires_at) = match (stored_at, expires_at) {
            (Some(stored_at), Some(expires_at)) if size_bytes == value.len() as i64 => {
                (stored_at, expires_at)
            }
            _ => {
                warn!("Removing corrupt persistent cache entry for {}", key);
                Self::delete(&state.conn, key.as_str())?;
                return Ok(None);
            }
        };

        if expires_at.is_some_and(|t| t <= Utc::now()) {
            debug!("Persistent tier entry for {} expired", key);
            Self::delete(&state.conn, key.as_str())?;
            return Ok(None);
        }

        let tick = state.next_tick();
        state
            .conn
            .execute(
                "UPDATE cache_entries SET last_accessed = ?1 WHERE key = ?2",
                params![tick, key.as_str()],
            )
            .map_err(|e| CellFetchError::Database {
                message: format!("Failed to update access counter: {}", e),
                source: Some(e),
            })?;

        Ok(Some(CacheEntry {
            key: key.clone(),
            size: value.len() as u64,
            payload: Bytes::from(value),
            stored_at,
            expires_at,
        }))
    }

    fn put(&self, entry: CacheEntry) -> Result<()> {
        let mut state = self.lock()?;

        if entry.size > self.capacity_bytes {
            Self::delete(&state.conn, entry.key.as_str())?;
            debug!(
                "Not admitting {} ({} bytes) to persistent tier of {} bytes",
                entry.key, entry.size, self.capacity_bytes
            );
            return Ok(());
        }

        let tick = state.next_tick();
        state
            .conn
            .execute(
                r#"
                INSERT OR REPLACE INTO cache_entries
                (key, value, size_bytes, stored_at, expires_at, last_accessed)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    entry.key.as_str(),
                    entry.payload.as_ref(),
                    entry.size as i64,
                    entry.stored_at.to_rfc3339(),
                    entry.expires_at.map(|t| t.to_rfc3339()),
                    tick
                ],
            )
            .map_err(|e| CellFetchError::Database {
                message: format!("Failed to set cache entry: {}", e),
                source: Some(e),
            })?;

        Self::evict_locked(&state.conn, self.capacity_bytes)?;
        Ok(())
    }

    fn remove(&self, key: &ResourceKey) -> Result<bool> {
        let state = self.lock()?;
        Ok(Self::delete(&state.conn, key.as_str())? > 0)
    }

    fn evict_to_size(&self, max_bytes: u64) -> Result<usize> {
        let state = self.lock()?;
        Self::evict_locked(&state.conn, max_bytes)
    }

    fn stats(&self) -> Result<TierStats> {
        let state = self.lock()?;
        let (count, size): (i64, i64) = state
            .conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM cache_entries",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| CellFetchError::Database {
                message: format!("Failed to query cache stats: {}", e),
                source: Some(e),
            })?;

        Ok(TierStats {
            entry_count: count as usize,
            size_bytes: size as u64,
            capacity_bytes: self.capacity_bytes,
        })
    }

    fn clear(&self) -> Result<()> {
        let state = self.lock()?;
        state
            .conn
            .execute("DELETE FROM cache_entries", [])
            .map_err(|e| CellFetchError::Database {
                message: format!("Failed to clear cache entries: {}", e),
                source: Some(e),
            })?;

        debug!("Cleared persistent cache tier");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_cache(capacity: u64) -> (TempDir, SqliteCache) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test_cache.sqlite");
        let cache = SqliteCache::open(&db_path, capacity).unwrap();
        (temp_dir, cache)
    }

    fn key(name: &str) -> ResourceKey {
        ResourceKey::parse(&format!("https://example.com/{}", name)).unwrap()
    }

    fn entry(name: &str, payload: &[u8]) -> CacheEntry {
        CacheEntry::new(key(name), Bytes::copy_from_slice(payload), None)
    }

    #[test]
    fn test_set_and_get() {
        let (_temp, cache) = create_test_cache(1024);

        cache.put(entry("a", b"hello world")).unwrap();

        let hit = cache.get(&key("a")).unwrap().unwrap();
        assert_eq!(hit.payload.as_ref(), b"hello world");
        assert_eq!(hit.size, 11);
        assert!(cache.get(&key("b")).unwrap().is_none());
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("cache.sqlite");

        {
            let cache = SqliteCache::open(&db_path, 1024).unwrap();
            cache.put(entry("a", b"persisted")).unwrap();
        }

        let cache = SqliteCache::open(&db_path, 1024).unwrap();
        let hit = cache.get(&key("a")).unwrap().unwrap();
        assert_eq!(hit.payload.as_ref(), b"persisted");
    }

    #[test]
    fn test_lru_eviction() {
        let (_temp, cache) = create_test_cache(20);

        cache.put(entry("a", &[1; 10])).unwrap();
        cache.put(entry("b", &[2; 10])).unwrap();
        cache.get(&key("a")).unwrap();
        cache.put(entry("c", &[3; 10])).unwrap();

        assert!(cache.get(&key("a")).unwrap().is_some());
        assert!(cache.get(&key("b")).unwrap().is_none());
        assert!(cache.get(&key("c")).unwrap().is_some());

        let stats = cache.stats().unwrap();
        assert_eq!(stats.entry_count, 2);
        assert!(stats.size_bytes <= 20);
    }

    #[test]
    fn test_reopen_with_smaller_capacity_evicts() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("cache.sqlite");

        {
            let cache = SqliteCache::open(&db_path, 100).unwrap();
            cache.put(entry("a", &[1; 30])).unwrap();
            cache.put(entry("b", &[2; 30])).unwrap();
        }

        let cache = SqliteCache::open(&db_path, 40).unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.entry_count, 1);
        assert!(cache.get(&key("b")).unwrap().is_some());
    }

    #[test]
    fn test_expired_entry_removed() {
        let (_temp, cache) = create_test_cache(1024);

        cache
            .put(CacheEntry::new(
                key("old"),
                Bytes::from_static(b"stale"),
                Some(Duration::ZERO),
            ))
            .unwrap();

        assert!(cache.get(&key("old")).unwrap().is_none());
        assert_eq!(cache.stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_corrupt_row_is_miss_and_removed() {
        let (_temp, cache) = create_test_cache(1024);
        cache.put(entry("a", b"12345")).unwrap();

        {
            let state = cache.lock().unwrap();
            state
                .conn
                .execute(
                    "UPDATE cache_entries SET size_bytes = 999 WHERE key = ?1",
                    params![key("a").as_str()],
                )
                .unwrap();
        }

        assert!(cache.get(&key("a")).unwrap().is_none());
        assert_eq!(cache.stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let (_temp, cache) = create_test_cache(1024);
        cache.put(entry("a", b"1")).unwrap();
        cache.put(entry("b", b"2")).unwrap();

        assert!(cache.remove(&key("a")).unwrap());
        assert!(!cache.remove(&key("a")).unwrap());

        cache.clear().unwrap();
        assert_eq!(cache.stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_unreadable_row_fails_eviction() {
        let (_temp, cache) = create_test_cache(1024);
        cache.put(entry("a", &[1; 10])).unwrap();
        cache.put(entry("b", &[2; 10])).unwrap();

        {
            let state = cache.lock().unwrap();
            state
                .conn
                .execute(
                    "UPDATE cache_entries SET size_bytes = 'garbled' WHERE key = ?1",
                    params![key("a").as_str()],
                )
                .unwrap();
        }

        let result = cache.evict_to_size(0);
        assert!(matches!(result, Err(CellFetchError::Database { .. })));
        assert!(cache.get(&key("b")).unwrap().is_some());
    }
}
