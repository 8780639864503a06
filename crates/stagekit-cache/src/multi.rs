//! `MultiLevelCache`: the L1 → L2 → L3 hierarchy with promotion on read
//! and write-through on write.

use std::sync::Arc;
use std::time::Duration;

use stagekit_core::value::CtxValue;

use crate::entry::CacheEntry;
use crate::level::{CacheLevel, CacheStats};

/// A cache composed of up to three levels. Any level may be omitted; a
/// two-level (L1+L3) or single-level (L1 only) cache is just a
/// `MultiLevelCache` with the unused slots left `None`.
#[derive(Clone)]
pub struct MultiLevelCache {
    l1: Option<Arc<dyn CacheLevel>>,
    l2: Option<Arc<dyn CacheLevel>>,
    l3: Option<Arc<dyn CacheLevel>>,
}

impl MultiLevelCache {
    /// Build a cache with no levels configured (every operation is a
    /// no-op/miss). Add levels with the `with_*` builders.
    #[must_use]
    pub fn new() -> Self {
        Self {
            l1: None,
            l2: None,
            l3: None,
        }
    }

    /// Attach an L1 (in-process) level.
    #[must_use]
    pub fn with_l1(mut self, level: Arc<dyn CacheLevel>) -> Self {
        self.l1 = Some(level);
        self
    }

    /// Attach an L2 (remote KV) level.
    #[must_use]
    pub fn with_l2(mut self, level: Arc<dyn CacheLevel>) -> Self {
        self.l2 = Some(level);
        self
    }

    /// Attach an L3 (durable) level.
    #[must_use]
    pub fn with_l3(mut self, level: Arc<dyn CacheLevel>) -> Self {
        self.l3 = Some(level);
        self
    }

    /// Try L1, then L2 (promoting to L1 on hit), then L3 (promoting to
    /// both on hit). Returns `None` only if every configured level
    /// misses.
    pub async fn get(&self, key: &str) -> Option<CtxValue> {
        if let Some(l1) = &self.l1 {
            if let Some(entry) = l1.get(key).await {
                return Some(entry.value);
            }
        }
        if let Some(l2) = &self.l2 {
            if let Some(entry) = l2.get(key).await {
                if let Some(l1) = &self.l1 {
                    l1.set(key, entry.value.clone(), ttl_remaining(&entry)).await;
                }
                return Some(entry.value);
            }
        }
        if let Some(l3) = &self.l3 {
            if let Some(entry) = l3.get(key).await {
                if let Some(l1) = &self.l1 {
                    l1.set(key, entry.value.clone(), ttl_remaining(&entry)).await;
                }
                if let Some(l2) = &self.l2 {
                    l2.set(key, entry.value.clone(), ttl_remaining(&entry)).await;
                }
                return Some(entry.value);
            }
        }
        None
    }

    /// Write `value` to every configured level.
    pub async fn set(&self, key: &str, value: CtxValue, ttl: Option<Duration>) {
        if let Some(l1) = &self.l1 {
            l1.set(key, value.clone(), ttl).await;
        }
        if let Some(l2) = &self.l2 {
            l2.set(key, value.clone(), ttl).await;
        }
        if let Some(l3) = &self.l3 {
            l3.set(key, value, ttl).await;
        }
    }

    /// Delete `key` from every configured level.
    pub async fn delete(&self, key: &str) {
        if let Some(l1) = &self.l1 {
            l1.delete(key).await;
        }
        if let Some(l2) = &self.l2 {
            l2.delete(key).await;
        }
        if let Some(l3) = &self.l3 {
            l3.delete(key).await;
        }
    }

    /// Whether any configured level currently holds a non-expired entry
    /// for `key`.
    pub async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Clear every configured level.
    pub async fn clear(&self) {
        if let Some(l1) = &self.l1 {
            l1.clear().await;
        }
        if let Some(l2) = &self.l2 {
            l2.clear().await;
        }
        if let Some(l3) = &self.l3 {
            l3.clear().await;
        }
    }

    /// Per-level stats, in `(l1, l2, l3)` order.
    #[must_use]
    pub fn stats(&self) -> (Option<CacheStats>, Option<CacheStats>, Option<CacheStats>) {
        (
            self.l1.as_ref().map(|l| l.stats()),
            self.l2.as_ref().map(|l| l.stats()),
            self.l3.as_ref().map(|l| l.stats()),
        )
    }
}

impl Default for MultiLevelCache {
    fn default() -> Self {
        Self::new()
    }
}

fn ttl_remaining(entry: &CacheEntry) -> Option<Duration> {
    let expires_at = entry.expires_at?;
    let remaining = expires_at - chrono::Utc::now();
    remaining.to_std().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::l1::InProcessLru;
    use crate::ttl::TtlCache;
    use serde_json::json;

    #[tokio::test]
    async fn miss_at_every_level_returns_none() {
        let cache = MultiLevelCache::new()
            .with_l1(Arc::new(InProcessLru::new(4)))
            .with_l3(Arc::new(TtlCache::new()));
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test]
    async fn write_through_populates_every_level() {
        let l1 = Arc::new(InProcessLru::new(4));
        let l3 = Arc::new(TtlCache::new());
        let cache = MultiLevelCache::new().with_l1(l1.clone()).with_l3(l3.clone());
        cache.set("k", json!("v"), None).await;
        assert!(l1.has("k").await);
        assert!(l3.has("k").await);
    }

    #[tokio::test]
    async fn l3_hit_promotes_to_l1() {
        let l1 = Arc::new(InProcessLru::new(4));
        let l3 = Arc::new(TtlCache::new());
        l3.set("k", json!("v"), None).await;
        let cache = MultiLevelCache::new().with_l1(l1.clone()).with_l3(l3.clone());
        assert_eq!(cache.get("k").await, Some(json!("v")));
        assert!(l1.has("k").await);
    }

    #[tokio::test]
    async fn delete_removes_from_every_level() {
        let l1 = Arc::new(InProcessLru::new(4));
        let cache = MultiLevelCache::new().with_l1(l1.clone());
        cache.set("k", json!(1), None).await;
        cache.delete("k").await;
        assert!(!cache.has("k").await);
    }

    #[tokio::test]
    async fn set_then_get_until_delete_invariant() {
        let cache = MultiLevelCache::new().with_l1(Arc::new(InProcessLru::new(4)));
        cache.set("k", json!(7), None).await;
        assert_eq!(cache.get("k").await, Some(json!(7)));
        cache.delete("k").await;
        assert_eq!(cache.get("k").await, None);
    }
}
