//! Bucket creation

use crate::acl::Acl;
use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::keys::check_component;
use crate::storage::{Bucket, MetadataStore};
use http::HeaderMap;
use metagate_core::{LockTable, ResourceKey};
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

/// Confirmation returned by a successful create
pub const BUCKET_CREATED: &str = "Bucket created";

#[derive(Debug, Clone, Copy)]
pub struct CreateBucketRequest<'a> {
    pub access_key: &'a str,
    pub bucket_uid: &'a str,
    pub bucket_name: &'a str,
    pub headers: &'a HeaderMap,
    pub location_constraint: Option<&'a str>,
}

#[derive(Clone)]
pub struct BucketLifecycleManager {
    metadata: Arc<dyn MetadataStore>,
    locks: LockTable,
}

impl BucketLifecycleManager {
    pub fn new(metadata: Arc<dyn MetadataStore>, locks: LockTable) -> Self {
        Self { metadata, locks }
    }

    pub async fn create_bucket(
        &self,
        ctx: &RequestContext,
        request: CreateBucketRequest<'_>,
    ) -> Result<&'static str, GatewayError> {
        let span = info_span!(
            "create_bucket",
            request_id = %ctx.request_id(),
            bucket = request.bucket_name,
            bucket_uid = request.bucket_uid,
        );
        self.create_bucket_inner(ctx, request).instrument(span).await
    }

    async fn create_bucket_inner(
        &self,
        ctx: &RequestContext,
        request: CreateBucketRequest<'_>,
    ) -> Result<&'static str, GatewayError> {
        check_component(request.bucket_name)?;
        let _guard = ctx
            .lock(&self.locks, ResourceKey::bucket(request.bucket_uid))
            .await?;

        ctx.checkpoint("existence check")?;
        if self.metadata.get_bucket(request.bucket_uid).await?.is_some() {
            return Err(GatewayError::BucketAlreadyExists(
                request.bucket_name.to_string(),
            ));
        }

        let mut bucket = Bucket::new(request.bucket_uid, request.bucket_name, request.access_key);
        bucket.location_constraint = request.location_constraint.map(String::from);
        bucket.acl = Acl::from_headers(request.headers);

        ctx.checkpoint("insert")?;
        if !self.metadata.create_bucket(bucket).await? {
            return Err(GatewayError::BucketAlreadyExists(
                request.bucket_name.to_string(),
            ));
        }

        info!(owner = request.access_key, "bucket created");
        Ok(BUCKET_CREATED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::GrantList;
    use crate::storage::EphemeralMetadataStore;
    use http::HeaderValue;

    fn manager() -> (Arc<EphemeralMetadataStore>, BucketLifecycleManager) {
        let metadata = Arc::new(EphemeralMetadataStore::new());
        let manager = BucketLifecycleManager::new(metadata.clone(), LockTable::new());
        (metadata, manager)
    }

    fn request<'a>(access_key: &'a str, headers: &'a HeaderMap) -> CreateBucketRequest<'a> {
        CreateBucketRequest {
            access_key,
            bucket_uid: "uid-b1",
            bucket_name: "b1",
            headers,
            location_constraint: None,
        }
    }

    #[tokio::test]
    async fn test_create_bucket() {
        let (metadata, manager) = manager();
        let headers = HeaderMap::new();

        let confirmation = manager
            .create_bucket(&RequestContext::new(), request("A", &headers))
            .await
            .unwrap();
        assert_eq!(confirmation, "Bucket created");

        let bucket = metadata.get_bucket("uid-b1").await.unwrap().unwrap();
        assert_eq!(bucket.owner, "A");
        assert_eq!(bucket.name, "b1");
        assert!(bucket.location_constraint.is_none());
        assert_eq!(bucket.acl, Acl::default());
    }

    #[tokio::test]
    async fn test_create_bucket_twice_conflicts() {
        let (metadata, manager) = manager();
        let headers = HeaderMap::new();
        let ctx = RequestContext::new();

        manager.create_bucket(&ctx, request("A", &headers)).await.unwrap();
        let err = manager
            .create_bucket(&ctx, request("B", &headers))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::BucketAlreadyExists(_)));
        assert_eq!(metadata.get_bucket("uid-b1").await.unwrap().unwrap().owner, "A");
    }

    #[tokio::test]
    async fn test_location_constraint_and_acl() {
        let (metadata, manager) = manager();
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-acl", HeaderValue::from_static("public-read"));
        headers.insert("x-amz-grant-full-control", HeaderValue::from_static("id=\"owner\""));

        let mut req = request("A", &headers);
        req.location_constraint = Some("eu-west-1");
        manager.create_bucket(&RequestContext::new(), req).await.unwrap();

        let bucket = metadata.get_bucket("uid-b1").await.unwrap().unwrap();
        assert_eq!(bucket.location_constraint.as_deref(), Some("eu-west-1"));
        assert_eq!(bucket.acl.canned.as_deref(), Some("public-read"));
        assert_eq!(bucket.acl.grant_full_control, Some(GrantList::new("id=\"owner\"")));
        assert!(bucket.acl.grant_read.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_creates_single_winner() {
        let (_, manager) = manager();
        let headers = HeaderMap::new();
        let ctx = RequestContext::new();

        let owners = ["A", "B", "C", "D"];
        let results = futures::future::join_all(
            owners
                .iter()
                .map(|owner| manager.create_bucket(&ctx, request(owner, &headers))),
        )
        .await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(GatewayError::BucketAlreadyExists(_))))
                .count(),
            3
        );
    }

    #[tokio::test]
    async fn test_expired_deadline_creates_nothing() {
        let (metadata, manager) = manager();
        let headers = HeaderMap::new();
        let ctx = RequestContext::new().with_deadline(tokio::time::Instant::now());

        let err = manager.create_bucket(&ctx, request("A", &headers)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled { .. }));
        assert!(metadata.get_bucket("uid-b1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bucket_name_with_delimiter_rejected() {
        let (_, manager) = manager();
        let headers = HeaderMap::new();
        let mut req = request("A", &headers);
        req.bucket_name = "bad..|..name";

        let err = manager.create_bucket(&RequestContext::new(), req).await.unwrap_err();
        assert!(matches!(err, GatewayError::ReservedDelimiter(_)));
    }
}
