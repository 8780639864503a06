//! The value stored at one cache key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stagekit_core::value::CtxValue;

/// A single cached value plus the bookkeeping needed for TTL expiry and
/// LRU eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The key this entry was stored under.
    pub key: String,
    /// The cached value.
    pub value: CtxValue,
    /// When this entry was written.
    pub written_at: DateTime<Utc>,
    /// When this entry expires, if it has a TTL.
    pub expires_at: Option<DateTime<Utc>>,
    /// Number of times this entry has been read since it was written.
    pub hits: u64,
}

impl CacheEntry {
    /// Construct a fresh entry with zero hits.
    #[must_use]
    pub fn new(key: impl Into<String>, value: CtxValue, ttl: Option<std::time::Duration>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            value,
            written_at: now,
            expires_at: ttl.and_then(|d| chrono::Duration::from_std(d).ok()).map(|d| now + d),
            hits: 0,
        }
    }

    /// Whether this entry's TTL has elapsed as of now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Utc::now() >= exp)
    }
}
