//! The `StorageBackend` contract checkpoints are persisted through.
//!
//! Concrete backends (local file, remote KV) are external collaborators
//! out of scope for this crate; [`InMemoryStorageBackend`]
//! is the reference implementation used by tests and single-process
//! embeddings.

use async_trait::async_trait;
use dashmap::DashMap;

/// String-keyed, opaque-byte-valued durable storage.
///
/// Implementations must give consistent read-after-write within a
/// single process; cross-process/transactional guarantees are not
/// required.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch a value, or `None` if the key is absent.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store a value, overwriting any existing entry.
    async fn put(&self, key: &str, value: Vec<u8>);

    /// Remove an entry. A no-op if the key is absent.
    async fn delete(&self, key: &str);

    /// Whether a value exists for `key`.
    async fn exists(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// All keys currently stored that start with `prefix`, in no
    /// particular order.
    async fn list(&self, prefix: &str) -> Vec<String>;
}

/// A `DashMap`-backed `StorageBackend` for tests and single-node use.
#[derive(Debug, Default)]
pub struct InMemoryStorageBackend {
    entries: DashMap<String, Vec<u8>>,
}

impl InMemoryStorageBackend {
    /// An empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorageBackend {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    async fn put(&self, key: &str, value: Vec<u8>) {
        self.entries.insert(key.to_string(), value);
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn list(&self, prefix: &str) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let backend = InMemoryStorageBackend::new();
        backend.put("a", vec![1, 2, 3]).await;
        assert_eq!(backend.get("a").await, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let backend = InMemoryStorageBackend::new();
        assert_eq!(backend.get("missing").await, None);
        assert!(!backend.exists("missing").await);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let backend = InMemoryStorageBackend::new();
        backend.put("a", vec![1]).await;
        backend.delete("a").await;
        assert!(!backend.exists("a").await);
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let backend = InMemoryStorageBackend::new();
        backend.put("checkpoint-x-1", vec![]).await;
        backend.put("checkpoint-x-2", vec![]).await;
        backend.put("checkpoint-y-1", vec![]).await;
        let mut keys = backend.list("checkpoint-x-").await;
        keys.sort();
        assert_eq!(keys, vec!["checkpoint-x-1", "checkpoint-x-2"]);
    }
}
