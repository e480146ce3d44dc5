//! Per-resource mutual exclusion

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Identity of a resource whose validate-then-mutate sequence must not interleave
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Bucket(String),
    Object { bucket_uid: String, key: String },
    Upload { bucket_uid: String, upload_id: String },
}

impl ResourceKey {
    pub fn bucket(bucket_uid: impl Into<String>) -> Self {
        Self::Bucket(bucket_uid.into())
    }

    pub fn object(bucket_uid: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Object {
            bucket_uid: bucket_uid.into(),
            key: key.into(),
        }
    }

    pub fn upload(bucket_uid: impl Into<String>, upload_id: impl Into<String>) -> Self {
        Self::Upload {
            bucket_uid: bucket_uid.into(),
            upload_id: upload_id.into(),
        }
    }
}

type LockMap = DashMap<ResourceKey, Arc<Mutex<()>>>;

/// Thread-safe table of async locks keyed by resource identity.
///
/// Entries are created on first use and removed again once the last guard
/// for a key is dropped, so the table only holds keys that are contended or
/// held.
#[derive(Clone, Default)]
pub struct LockTable {
    locks: Arc<LockMap>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: ResourceKey) -> ResourceGuard {
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        ResourceGuard {
            locks: self.locks.clone(),
            key,
            guard: Some(guard),
        }
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held lock on one resource; released on drop
pub struct ResourceGuard {
    locks: Arc<LockMap>,
    key: ResourceKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ResourceGuard {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard").field("key", &self.key).finish()
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        // Release the mutex first so the map holds the only remaining
        // reference when nobody else is waiting.
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
