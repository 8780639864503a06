//! `CacheWarmer`: pre-populate a cache from a fetcher, concurrently,
//! without refetching keys it has already warmed.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use stagekit_core::value::CtxValue;

use crate::multi::MultiLevelCache;

/// Tracks which keys have already been warmed so repeated `warm` calls
/// for the same key set do not refetch.
pub struct CacheWarmer {
    warmed: Mutex<HashSet<String>>,
}

impl Default for CacheWarmer {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheWarmer {
    /// A warmer with no keys warmed yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            warmed: Mutex::new(HashSet::new()),
        }
    }

    /// Fetch and set every key in `keys` that is not already cached (by
    /// `cache.has`) and not already warmed by a prior call, running
    /// fetches concurrently.
    pub async fn warm<F, Fut>(&self, cache: &MultiLevelCache, keys: &[String], fetcher: F)
    where
        F: Fn(String) -> Fut + Send + Sync,
        Fut: Future<Output = Option<CtxValue>> + Send,
    {
        let to_fetch: Vec<String> = {
            let warmed = self.warmed.lock();
            let mut pending = Vec::new();
            for key in keys {
                if !warmed.contains(key) {
                    pending.push(key.clone());
                }
            }
            pending
        };

        let mut still_missing = Vec::new();
        for key in &to_fetch {
            if !cache.has(key).await {
                still_missing.push(key.clone());
            }
        }

        let fetcher = &fetcher;
        let fetches = still_missing.into_iter().map(|key| async move {
            let value = fetcher(key.clone()).await;
            (key, value)
        });
        let results = futures::future::join_all(fetches).await;

        let mut warmed = self.warmed.lock();
        for (key, value) in results {
            if let Some(value) = value {
                cache.set(&key, value, None::<Duration>).await;
            }
            warmed.insert(key);
        }
        drop(warmed);

        // Keys that were already cached but not yet tracked still count
        // as warmed, so a later call does not re-check `has` for them.
        let mut warmed = self.warmed.lock();
        for key in &to_fetch {
            warmed.insert(key.clone());
        }
    }

    /// Forget every key this warmer has tracked, forcing the next
    /// `warm` call to refetch.
    pub fn reset(&self) {
        self.warmed.lock().clear();
    }
}

#[allow(unused)]
fn _assert_send_sync()
where
    Arc<CacheWarmer>: Send + Sync,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::l1::InProcessLru;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn warms_missing_keys_concurrently() {
        let cache = MultiLevelCache::new().with_l1(Arc::new(InProcessLru::new(8)));
        let warmer = CacheWarmer::new();
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        warmer
            .warm(
                &cache,
                &["a".to_string(), "b".to_string()],
                move |key| {
                    let calls = calls2.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Some(json!(key))
                    }
                },
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get("a").await, Some(json!("a")));
    }

    #[tokio::test]
    async fn does_not_refetch_already_warmed_keys() {
        let cache = MultiLevelCache::new().with_l1(Arc::new(InProcessLru::new(8)));
        let warmer = CacheWarmer::new();
        let calls = Arc::new(AtomicU32::new(0));

        let calls2 = calls.clone();
        warmer
            .warm(&cache, &["a".to_string()], move |key| {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Some(json!(key))
                }
            })
            .await;

        cache.delete("a").await;

        let calls3 = calls.clone();
        warmer
            .warm(&cache, &["a".to_string()], move |key| {
                let calls = calls3.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Some(json!(key))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
