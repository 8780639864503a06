//! The `CacheLevel` contract every L1/L2/L3 backend implements.

use async_trait::async_trait;

use stagekit_core::value::CtxValue;

use crate::entry::CacheEntry;

/// Point-in-time counters for one cache level.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Successful lookups.
    pub hits: u64,
    /// Lookups that found nothing (or an expired entry).
    pub misses: u64,
    /// Entries currently stored.
    pub size: usize,
    /// Entries evicted to make room (L1) or expired away (L2/L3).
    pub evictions: u64,
}

/// One level of the cache hierarchy.
///
/// Implementations MUST be safe for concurrent use and MUST treat each
/// key's operations as atomic.
#[async_trait]
pub trait CacheLevel: Send + Sync {
    /// Fetch an entry, returning `None` on miss or expiry.
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Store a value, write-through semantics (callers write to every
    /// configured level, not just this one).
    async fn set(&self, key: &str, value: CtxValue, ttl: Option<std::time::Duration>);

    /// Remove an entry.
    async fn delete(&self, key: &str);

    /// Whether a non-expired entry exists for `key`.
    async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Remove every entry.
    async fn clear(&self);

    /// A snapshot of this level's counters.
    fn stats(&self) -> CacheStats;
}
