//! In-memory test doubles for the checkpoint and dispatch subsystems'
//! external collaborators, wrapping their real in-memory reference
//! implementations with a call-history log a test can assert against.
//!
//! Record what was called, let the test verify it happened, rather
//! than a full mocking-framework expectation DSL.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use stagekit_checkpoint::{InMemoryStorageBackend, StorageBackend};
use stagekit_dispatch::{MessageQueue, WorkItem};

/// One recorded call against a [`RecordingStorageBackend`].
#[derive(Debug, Clone)]
pub enum StorageCall {
    /// A `get` call, with whether it found a value.
    Get { key: String, hit: bool, at: DateTime<Utc> },
    /// A `put` call.
    Put { key: String, at: DateTime<Utc> },
    /// A `delete` call.
    Delete { key: String, at: DateTime<Utc> },
}

/// Wraps [`InMemoryStorageBackend`], logging every call so a test can
/// assert exactly which keys a component touched and in what order.
#[derive(Default)]
pub struct RecordingStorageBackend {
    inner: InMemoryStorageBackend,
    calls: Mutex<Vec<StorageCall>>,
}

impl RecordingStorageBackend {
    /// An empty backend with no recorded calls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The call history so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<StorageCall> {
        self.calls.lock().clone()
    }

    /// Whether `key` was ever passed to `put`.
    #[must_use]
    pub fn was_written(&self, key: &str) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|call| matches!(call, StorageCall::Put { key: k, .. } if k == key))
    }

    /// Clear the recorded history without touching stored entries.
    pub fn clear_history(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl StorageBackend for RecordingStorageBackend {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let value = self.inner.get(key).await;
        self.calls.lock().push(StorageCall::Get {
            key: key.to_string(),
            hit: value.is_some(),
            at: Utc::now(),
        });
        value
    }

    async fn put(&self, key: &str, value: Vec<u8>) {
        self.inner.put(key, value).await;
        self.calls.lock().push(StorageCall::Put {
            key: key.to_string(),
            at: Utc::now(),
        });
    }

    async fn delete(&self, key: &str) {
        self.inner.delete(key).await;
        self.calls.lock().push(StorageCall::Delete {
            key: key.to_string(),
            at: Utc::now(),
        });
    }

    async fn list(&self, prefix: &str) -> Vec<String> {
        self.inner.list(prefix).await
    }
}

/// One recorded call against a [`RecordingQueue`].
#[derive(Debug, Clone)]
pub enum QueueCall {
    /// An `enqueue` call.
    Enqueue { stage_name: String, at: DateTime<Utc> },
    /// A `dequeue` call, with whether it returned an item.
    Dequeue { hit: bool, at: DateTime<Utc> },
}

/// Wraps [`MessageQueue`], logging every enqueue/dequeue so a test can
/// assert on dispatch order without racing the real queue's internal
/// locking.
#[derive(Default)]
pub struct RecordingQueue {
    inner: MessageQueue,
    calls: Mutex<Vec<QueueCall>>,
}

impl RecordingQueue {
    /// An empty queue with no recorded calls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an item, recording the call.
    pub fn enqueue(&self, item: WorkItem) {
        self.calls.lock().push(QueueCall::Enqueue {
            stage_name: item.stage_name.clone(),
            at: Utc::now(),
        });
        self.inner.enqueue(item);
    }

    /// Dequeue the next item, recording the call.
    pub fn dequeue(&self) -> Option<WorkItem> {
        let item = self.inner.dequeue();
        self.calls.lock().push(QueueCall::Dequeue {
            hit: item.is_some(),
            at: Utc::now(),
        });
        item
    }

    /// Number of items currently queued.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// The call history so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<QueueCall> {
        self.calls.lock().clone()
    }
}

/// A shared handle to a [`RecordingStorageBackend`], convenient for
/// passing into a checkpoint manager while retaining a reference for
/// assertions.
#[must_use]
pub fn recording_storage() -> Arc<RecordingStorageBackend> {
    Arc::new(RecordingStorageBackend::new())
}
