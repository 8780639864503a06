//! A `moka`-backed TTL cache used as the reference L2/L3 implementation.
//! Real deployments back L2/L3 with a remote KV store or a durable
//! store; this type exists so the multi-level cache and its tests have
//! *something* concrete to promote into and out of.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;

use stagekit_core::value::CtxValue;

use crate::entry::CacheEntry;
use crate::level::{CacheLevel, CacheStats};

/// Honors each entry's own `ttl`, set at `CacheLevel::set` time, rather
/// than a single cache-wide duration — matching spec's "entries are
/// lazily expired on read" per-key semantics.
struct PerEntryExpiry;

impl Expiry<String, CacheEntry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value
            .expires_at
            .map(|exp| (exp - chrono::Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}

/// TTL-based cache level backed by `moka::future::Cache`, with
/// hit/miss/eviction counters moka itself does not expose.
pub struct TtlCache {
    entries: Cache<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: Arc<AtomicU64>,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlCache {
    /// An empty cache with no overall capacity bound; each entry expires
    /// according to its own TTL.
    #[must_use]
    pub fn new() -> Self {
        let evictions = Arc::new(AtomicU64::new(0));
        let listener_evictions = evictions.clone();
        let entries = Cache::builder()
            .expire_after(PerEntryExpiry)
            .eviction_listener(move |_key, _value, _cause| {
                listener_evictions.fetch_add(1, Ordering::Relaxed);
            })
            .build();
        Self {
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions,
        }
    }

    /// Force moka's pending maintenance (expiry/eviction bookkeeping) to
    /// run synchronously, so tests can assert on post-expiry state
    /// without depending on moka's internal scheduling.
    pub async fn compact(&self) {
        self.entries.run_pending_tasks().await;
    }
}

#[async_trait]
impl CacheLevel for TtlCache {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        match self.entries.get(key).await {
            Some(mut entry) => {
                if entry.is_expired() {
                    self.entries.invalidate(key).await;
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                entry.hits += 1;
                self.entries.insert(key.to_string(), entry.clone()).await;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: CtxValue, ttl: Option<Duration>) {
        self.entries
            .insert(key.to_string(), CacheEntry::new(key, value, ttl))
            .await;
    }

    async fn delete(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    async fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.entries.entry_count() as usize,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let cache = TtlCache::new();
        cache.set("k", json!("v"), None).await;
        assert_eq!(cache.get("k").await.unwrap().value, json!("v"));
    }

    #[tokio::test]
    async fn compact_removes_expired_entries() {
        let cache = TtlCache::new();
        cache
            .set("k", json!(1), Some(Duration::from_millis(1)))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.compact().await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = TtlCache::new();
        cache.set("k", json!("v"), None).await;
        cache.delete("k").await;
        assert!(cache.get("k").await.is_none());
    }
}
