//! Storage backend traits

use crate::acl::Acl;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Errors from the metadata and data stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Bucket not found in store: {0}")]
    BucketNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Opaque handle to a payload held by a [`DataStore`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// A fresh random handle
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response fields that have a slot in the schema but no implementation yet.
/// They are always written and emitted as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedFields {
    #[serde(rename = "x-amz-server-side-encryption")]
    pub server_side_encryption: String,
    #[serde(rename = "x-amz-server-side-encryption-aws-kms-key-id")]
    pub kms_key_id: String,
    #[serde(rename = "x-amz-server-side-encryption-customer-algorithm")]
    pub customer_algorithm: String,
    #[serde(rename = "x-amz-delete-marker")]
    pub delete_marker: String,
    #[serde(rename = "x-amz-storage-class")]
    pub storage_class: String,
    #[serde(rename = "x-amz-website-redirect-location")]
    pub website_redirect_location: String,
    #[serde(rename = "x-amz-server-version-id")]
    pub server_version_id: String,
}

impl ReservedFields {
    /// Header name and value pairs, in a stable order
    pub fn headers(&self) -> [(&'static str, &str); 7] {
        [
            ("x-amz-server-side-encryption", &self.server_side_encryption),
            ("x-amz-server-side-encryption-aws-kms-key-id", &self.kms_key_id),
            (
                "x-amz-server-side-encryption-customer-algorithm",
                &self.customer_algorithm,
            ),
            ("x-amz-delete-marker", &self.delete_marker),
            ("x-amz-storage-class", &self.storage_class),
            (
                "x-amz-website-redirect-location",
                &self.website_redirect_location,
            ),
            ("x-amz-server-version-id", &self.server_version_id),
        ]
    }
}

/// Metadata record stored in a bucket key-map, for objects, parts and
/// upload overviews alike
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ObjectMetadata {
    pub content_length: u64,
    pub content_md5: String,
    pub last_modified: DateTime<Utc>,
    /// Set when the record is first created and kept across overwrites
    #[serde(rename = "Date")]
    pub creation_date: DateTime<Utc>,
    #[serde(rename = "location")]
    pub locations: Vec<Location>,
    pub user_metadata: BTreeMap<String, String>,
    #[serde(flatten)]
    pub reserved: ReservedFields,
}

impl ObjectMetadata {
    /// An empty record created at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            content_length: 0,
            content_md5: String::new(),
            last_modified: now,
            creation_date: now,
            locations: Vec::new(),
            user_metadata: BTreeMap::new(),
            reserved: ReservedFields::default(),
        }
    }
}

/// A bucket record. The key-map belonging to the bucket is held by the
/// [`MetadataStore`] and reached through its key operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub uid: String,
    pub name: String,
    pub owner: String,
    pub acl: Acl,
    pub location_constraint: Option<String>,
    pub creation_date: DateTime<Utc>,
}

impl Bucket {
    pub fn new(uid: impl Into<String>, name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            owner: owner.into(),
            acl: Acl::default(),
            location_constraint: None,
            creation_date: Utc::now(),
        }
    }
}

/// One key-map entry returned by a listing
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub key: String,
    pub metadata: ObjectMetadata,
}

/// Keyed store of bucket records and their key-maps
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Look up a bucket by UID
    async fn get_bucket(&self, bucket_uid: &str) -> Result<Option<Bucket>, StoreError>;

    /// Insert a bucket unless its UID is taken. Returns whether it was inserted.
    async fn create_bucket(&self, bucket: Bucket) -> Result<bool, StoreError>;

    /// All bucket records in the namespace
    async fn list_buckets(&self) -> Result<Vec<Bucket>, StoreError>;

    /// Read one key-map entry
    async fn get_object(
        &self,
        bucket_uid: &str,
        key: &str,
    ) -> Result<Option<ObjectMetadata>, StoreError>;

    /// Insert or replace one key-map entry
    async fn put_object(
        &self,
        bucket_uid: &str,
        key: &str,
        metadata: ObjectMetadata,
    ) -> Result<(), StoreError>;

    /// Entries whose key starts with `prefix`, ordered by key
    async fn list_objects(
        &self,
        bucket_uid: &str,
        prefix: &str,
    ) -> Result<Vec<StoredEntry>, StoreError>;

    /// Remove every listed key in one call. Missing keys are ignored.
    async fn batch_delete(&self, bucket_uid: &str, keys: &[String]) -> Result<(), StoreError>;
}

/// Keyed store of raw payloads
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Store a payload under a new handle that aliases no live entry
    async fn put(&self, value: Bytes) -> Result<Location, StoreError>;

    /// Read a payload back
    async fn get(&self, location: &Location) -> Result<Option<Bytes>, StoreError>;

    /// Remove every listed handle. Missing handles are not errors.
    async fn delete(&self, locations: &[Location]) -> Result<(), StoreError>;
}
