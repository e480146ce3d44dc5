//! In-memory ephemeral storage backends

use super::traits::*;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory bucket: the record plus its key-map
struct InMemoryBucket {
    record: Bucket,
    key_map: RwLock<BTreeMap<String, ObjectMetadata>>,
}

impl InMemoryBucket {
    fn new(record: Bucket) -> Self {
        Self {
            record,
            key_map: RwLock::new(BTreeMap::new()),
        }
    }
}

/// Ephemeral (in-memory) metadata store
#[derive(Default)]
pub struct EphemeralMetadataStore {
    buckets: DashMap<String, Arc<InMemoryBucket>>,
}

impl EphemeralMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, bucket_uid: &str) -> Result<Arc<InMemoryBucket>, StoreError> {
        self.buckets
            .get(bucket_uid)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::BucketNotFound(bucket_uid.to_string()))
    }
}

#[async_trait]
impl MetadataStore for EphemeralMetadataStore {
    async fn get_bucket(&self, bucket_uid: &str) -> Result<Option<Bucket>, StoreError> {
        Ok(self
            .buckets
            .get(bucket_uid)
            .map(|entry| entry.record.clone()))
    }

    async fn create_bucket(&self, bucket: Bucket) -> Result<bool, StoreError> {
        match self.buckets.entry(bucket.uid.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(InMemoryBucket::new(bucket)));
                Ok(true)
            }
        }
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>, StoreError> {
        let mut buckets: Vec<Bucket> = self
            .buckets
            .iter()
            .map(|entry| entry.record.clone())
            .collect();
        buckets.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(buckets)
    }

    async fn get_object(
        &self,
        bucket_uid: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StoreError> {
        let bucket = self.bucket(bucket_uid)?;
        let key_map = bucket.key_map.read();
        Ok(key_map.get(key).cloned())
    }

    async fn put_object(
        &self,
        bucket_uid: &str,
        key: &str,
        metadata: ObjectMetadata,
    ) -> Result<(), StoreError> {
        let bucket = self.bucket(bucket_uid)?;
        bucket.key_map.write().insert(key.to_string(), metadata);
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket_uid: &str,
        prefix: &str,
    ) -> Result<Vec<StoredEntry>, StoreError> {
        let bucket = self.bucket(bucket_uid)?;
        let key_map = bucket.key_map.read();

        Ok(key_map
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, metadata)| StoredEntry {
                key: key.clone(),
                metadata: metadata.clone(),
            })
            .collect())
    }

    async fn batch_delete(&self, bucket_uid: &str, keys: &[String]) -> Result<(), StoreError> {
        let bucket = self.bucket(bucket_uid)?;
        let mut key_map = bucket.key_map.write();
        for key in keys {
            key_map.remove(key);
        }
        Ok(())
    }
}

/// Ephemeral (in-memory) data store
#[derive(Default)]
pub struct EphemeralDataStore {
    objects: DashMap<Location, Bytes>,
}

impl EphemeralDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payloads currently held
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl DataStore for EphemeralDataStore {
    async fn put(&self, value: Bytes) -> Result<Location, StoreError> {
        loop {
            if let Entry::Vacant(slot) = self.objects.entry(Location::generate()) {
                let location = slot.key().clone();
                slot.insert(value);
                return Ok(location);
            }
        }
    }

    async fn get(&self, location: &Location) -> Result<Option<Bytes>, StoreError> {
        Ok(self.objects.get(location).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, locations: &[Location]) -> Result<(), StoreError> {
        for location in locations {
            self.objects.remove(location);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bucket_operations() {
        let store = EphemeralMetadataStore::new();

        assert!(store.create_bucket(Bucket::new("uid-1", "b1", "A")).await.unwrap());
        assert!(!store.create_bucket(Bucket::new("uid-1", "b1", "B")).await.unwrap());

        let bucket = store.get_bucket("uid-1").await.unwrap().unwrap();
        assert_eq!(bucket.owner, "A");
        assert_eq!(store.list_buckets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_data_operations() {
        let store = EphemeralDataStore::new();

        let location = store.put(Bytes::from("hello world")).await.unwrap();
        assert!(!location.is_empty());
        assert_eq!(
            store.get(&location).await.unwrap().unwrap(),
            Bytes::from("hello world")
        );

        store.delete(&[location.clone()]).await.unwrap();
        assert!(store.get(&location).await.unwrap().is_none());
    }
}
