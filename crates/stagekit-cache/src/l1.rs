//! L1: a bounded, approximately-LRU in-process cache.
//!
//! "Eviction by approximate LRU" maps directly onto `lru::LruCache`,
//! which tracks recency on every `get`/`put`.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;

use stagekit_core::value::CtxValue;

use crate::entry::CacheEntry;
use crate::level::{CacheLevel, CacheStats};

/// In-process L1 cache, bounded by entry count.
pub struct InProcessLru {
    inner: Mutex<LruCache<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl InProcessLru {
    /// Build a cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl CacheLevel for InProcessLru {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut guard = self.inner.lock();
        match guard.get_mut(key) {
            Some(entry) if entry.is_expired() => {
                guard.pop(key);
                drop(guard);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                entry.hits += 1;
                let out = entry.clone();
                drop(guard);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(out)
            }
            None => {
                drop(guard);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: CtxValue, ttl: Option<Duration>) {
        let entry = CacheEntry::new(key, value, ttl);
        let mut guard = self.inner.lock();
        if guard.len() == guard.cap().get() && !guard.contains(key) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        guard.put(key.to_string(), entry);
    }

    async fn delete(&self, key: &str) {
        self.inner.lock().pop(key);
    }

    async fn clear(&self) {
        self.inner.lock().clear();
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self.inner.lock().len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let cache = InProcessLru::new(2);
        cache.set("a", json!(1), None).await;
        cache.set("b", json!(2), None).await;
        // touch "a" so "b" becomes the LRU entry
        cache.get("a").await;
        cache.set("c", json!(3), None).await;
        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("c").await.is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn expired_entries_are_treated_as_misses() {
        let cache = InProcessLru::new(4);
        cache.set("a", json!(1), Some(Duration::from_millis(1))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("a").await.is_none());
    }

    #[tokio::test]
    async fn hit_count_increments() {
        let cache = InProcessLru::new(4);
        cache.set("a", json!(1), None).await;
        cache.get("a").await;
        let entry = cache.get("a").await.unwrap();
        assert_eq!(entry.hits, 2);
    }
}
