//! Persistent, embedded key-value cache (spec §4.B) backed by `sled`, the
//! only LSM-style embedded store anywhere in the retrieved pack. Values are
//! stored as a small JSON envelope carrying the expiry alongside the bytes,
//! matching the rest of this crate's habit of reaching for `serde_json` over
//! a bespoke binary format.
//!
//! `sled` has no separate value-log; `CacheStats::vlog_size` is always `0`
//! and `lsm_size` carries the whole on-disk footprint. `size()` walks every
//! key (`sled::Tree::len()` is already O(n) internally) — see the crate-level
//! design notes on that tradeoff.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use repodocs_core::{Cache, CacheStats, Error, Result};

const DEFAULT_COMPACTION_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// `None` uses `~/.repodocs/cache` (via the `dirs` crate).
    pub directory: Option<PathBuf>,
    /// Backs the store with a temporary directory removed on drop.
    pub in_memory: bool,
    pub compaction_interval: Duration,
    /// Surfaces `sled`'s own internal profiling/diagnostics: wired to
    /// `sled::Config::print_profile_on_drop` and to `tracing::trace!` events
    /// on the get/set hot path, both off by default.
    pub enable_internal_log: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            in_memory: false,
            compaction_interval: DEFAULT_COMPACTION_INTERVAL,
            enable_internal_log: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    expires_at: Option<u64>,
    value: Vec<u8>,
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub struct SledCache {
    db: sled::Db,
    shutdown: CancellationToken,
    closed: AtomicBool,
    internal_log: bool,
}

impl SledCache {
    pub fn open(config: CacheConfig) -> Result<Arc<Self>> {
        let sled_config = if config.in_memory {
            sled::Config::new().temporary(true)
        } else {
            let dir = config.directory.clone().unwrap_or_else(default_cache_dir);
            sled::Config::new().path(dir)
        };
        let sled_config = sled_config.print_profile_on_drop(config.enable_internal_log);
        let db = sled_config
            .open()
            .map_err(|e| Error::Cache(format!("failed to open cache: {e}")))?;

        let cache = Arc::new(Self {
            db,
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
            internal_log: config.enable_internal_log,
        });
        cache.spawn_compaction(config.compaction_interval);
        Ok(cache)
    }

    fn spawn_compaction(self: &Arc<Self>, interval: Duration) {
        let db = self.db.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = db.flush_async().await {
                            tracing::warn!(error = %e, "cache background flush failed");
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }
}

#[async_trait]
impl Cache for SledCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if self.internal_log {
            tracing::trace!(key, "cache get");
        }
        let db = self.db.clone();
        let owned_key = key.to_string();
        let raw = tokio::task::spawn_blocking(move || db.get(owned_key.as_bytes()))
            .await
            .map_err(|e| Error::Cache(format!("cache get task failed: {e}")))?
            .map_err(|e| Error::Cache(e.to_string()))?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        let entry: StoredEntry =
            serde_json::from_slice(&raw).map_err(|e| Error::Cache(format!("corrupt cache entry: {e}")))?;
        if let Some(expires_at) = entry.expires_at {
            if now_epoch_secs() >= expires_at {
                return Ok(None);
            }
        }
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        if self.internal_log {
            tracing::trace!(key, ttl_secs = ttl.as_secs(), "cache set");
        }
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(now_epoch_secs() + ttl.as_secs())
        };
        let entry = StoredEntry { expires_at, value };
        let bytes = serde_json::to_vec(&entry).map_err(|e| Error::Cache(e.to_string()))?;

        let db = self.db.clone();
        let owned_key = key.to_string();
        tokio::task::spawn_blocking(move || db.insert(owned_key.as_bytes(), bytes))
            .await
            .map_err(|e| Error::Cache(format!("cache set task failed: {e}")))?
            .map_err(|e| Error::Cache(e.to_string()))?;
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let db = self.db.clone();
        let owned_key = key.to_string();
        tokio::task::spawn_blocking(move || db.remove(owned_key.as_bytes()))
            .await
            .map_err(|e| Error::Cache(format!("cache delete task failed: {e}")))?
            .map_err(|e| Error::Cache(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.clear())
            .await
            .map_err(|e| Error::Cache(format!("cache clear task failed: {e}")))?
            .map_err(|e| Error::Cache(e.to_string()))?;
        Ok(())
    }

    async fn size(&self) -> Result<u64> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.len() as u64)
            .await
            .map_err(|e| Error::Cache(format!("cache size task failed: {e}")))
    }

    async fn stats(&self) -> Result<CacheStats> {
        let db = self.db.clone();
        let (entries, on_disk) = tokio::task::spawn_blocking(move || {
            let entries = db.len() as u64;
            let on_disk = db.size_on_disk().unwrap_or(0);
            (entries, on_disk)
        })
        .await
        .map_err(|e| Error::Cache(format!("cache stats task failed: {e}")))?;

        Ok(CacheStats {
            entries,
            lsm_size: on_disk,
            vlog_size: 0,
        })
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shutdown.cancel();
        self.db
            .flush_async()
            .await
            .map_err(|e| Error::Cache(format!("cache close flush failed: {e}")))?;
        Ok(())
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".repodocs")
        .join("cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config() -> (tempfile::TempDir, CacheConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            directory: Some(dir.path().to_path_buf()),
            in_memory: false,
            compaction_interval: Duration::from_secs(3600),
            enable_internal_log: false,
        };
        (dir, config)
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (_dir, config) = temp_config();
        let cache = SledCache::open(config).unwrap();
        cache.set("k1", b"hello".to_vec(), Duration::from_secs(60)).await.unwrap();
        let got = cache.get("k1").await.unwrap();
        assert_eq!(got, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let (_dir, config) = temp_config();
        let cache = SledCache::open(config).unwrap();
        assert_eq!(cache.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn zero_ttl_never_expires() {
        let (_dir, config) = temp_config();
        let cache = SledCache::open(config).unwrap();
        cache.set("k", b"v".to_vec(), Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_miss() {
        let (_dir, config) = temp_config();
        let cache = SledCache::open(config).unwrap();
        let entry = StoredEntry {
            expires_at: Some(0),
            value: b"stale".to_vec(),
        };
        let bytes = serde_json::to_vec(&entry).unwrap();
        cache.db.insert("k", bytes).unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (_dir, config) = temp_config();
        let cache = SledCache::open(config).unwrap();
        cache.delete("never-there").await.unwrap();
        cache.set("k", b"v".to_vec(), Duration::ZERO).await.unwrap();
        cache.delete("k").await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let (_dir, config) = temp_config();
        let cache = SledCache::open(config).unwrap();
        cache.set("a", b"1".to_vec(), Duration::ZERO).await.unwrap();
        cache.set("b", b"2".to_vec(), Duration::ZERO).await.unwrap();
        cache.clear().await.unwrap();
        assert_eq!(cache.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stats_reports_entry_count() {
        let (_dir, config) = temp_config();
        let cache = SledCache::open(config).unwrap();
        cache.set("a", b"1".to_vec(), Duration::ZERO).await.unwrap();
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.vlog_size, 0);
    }

    #[tokio::test]
    async fn enable_internal_log_does_not_change_observable_behavior() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            directory: Some(dir.path().to_path_buf()),
            in_memory: false,
            compaction_interval: Duration::from_secs(3600),
            enable_internal_log: true,
        };
        let cache = SledCache::open(config).unwrap();
        cache.set("k", b"v".to_vec(), Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn in_memory_cache_is_usable() {
        let cache = SledCache::open(CacheConfig {
            in_memory: true,
            ..Default::default()
        })
        .unwrap();
        cache.set("k", b"v".to_vec(), Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
    }
}
