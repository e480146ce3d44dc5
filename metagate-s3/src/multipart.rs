//! Multipart uploads: initiate, upload part, list parts and abort
//!
//! Every upload lives in the bucket's shadow bucket as one overview entry
//! plus one entry per part. Part entries carry their data location inside
//! the key itself, so an abort can find every payload from a single listing.

use crate::auth::{AuthorizationService, PolicyDecision, PolicyRequest};
use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::keys::{check_component, mpu_bucket_uid, OverviewKey, PartKey, DELIMITER, MPU_BUCKET_PREFIX};
use crate::object::{reject_server_side_encryption, user_metadata, write_payload};
use crate::storage::{Bucket, DataStore, Location, MetadataStore, ObjectMetadata};
use crate::validator::{MetadataValidator, MultipartTarget, RequestType, ValidationParams};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http::HeaderMap;
use metagate_core::{LockTable, ResourceGuard, ResourceKey};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Highest part number a client may upload
pub const MAX_PART_NUMBER: u32 = 10_000;

/// Identifies one open upload
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub access_key: &'a str,
    pub bucket_uid: &'a str,
    pub object_key: &'a str,
    pub upload_id: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct InitiateUploadRequest<'a> {
    pub access_key: &'a str,
    pub bucket_uid: &'a str,
    pub object_key: &'a str,
    pub headers: &'a HeaderMap,
}

#[derive(Debug, Clone)]
pub struct UploadPartRequest<'a> {
    pub upload: UploadRequest<'a>,
    pub part_number: u32,
    pub headers: &'a HeaderMap,
    pub body: Bytes,
}

/// A stored part as reported by [`MultipartUploadCoordinator::list_parts`]
#[derive(Debug, Clone, PartialEq)]
pub struct PartInfo {
    pub part_number: u32,
    pub etag: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub location: Location,
}

#[derive(Clone)]
pub struct MultipartUploadCoordinator {
    metadata: Arc<dyn MetadataStore>,
    data: Arc<dyn DataStore>,
    locks: LockTable,
    auth: AuthorizationService,
    validator: MetadataValidator,
}

impl MultipartUploadCoordinator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        data: Arc<dyn DataStore>,
        locks: LockTable,
        auth: AuthorizationService,
        validator: MetadataValidator,
    ) -> Self {
        Self {
            metadata,
            data,
            locks,
            auth,
            validator,
        }
    }

    /// Open a new upload and return its id
    pub async fn initiate_upload(
        &self,
        ctx: &RequestContext,
        request: InitiateUploadRequest<'_>,
    ) -> Result<String, GatewayError> {
        let span = info_span!(
            "initiate_upload",
            request_id = %ctx.request_id(),
            bucket_uid = request.bucket_uid,
            key = request.object_key,
        );
        self.initiate_upload_inner(ctx, request).instrument(span).await
    }

    async fn initiate_upload_inner(
        &self,
        ctx: &RequestContext,
        request: InitiateUploadRequest<'_>,
    ) -> Result<String, GatewayError> {
        reject_server_side_encryption(request.headers)?;

        let policy = self
            .policy(request.access_key, request.bucket_uid, request.object_key)
            .await?;

        let upload_id = Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let overview = OverviewKey::new(
            request.object_key,
            upload_id.as_str(),
            request.access_key,
            now.to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;

        let _guard = ctx
            .lock(
                &self.locks,
                ResourceKey::upload(request.bucket_uid, upload_id.as_str()),
            )
            .await?;

        ctx.checkpoint("validation")?;
        let params =
            ValidationParams::new(request.access_key, request.bucket_uid, RequestType::InitiateMpu)
                .with_policy(policy);
        let bucket = self.validator.validate_bucket(&params).await?;

        ctx.checkpoint("shadow bucket")?;
        let mpu_uid = mpu_bucket_uid(&bucket.uid);
        let shadow = Bucket::new(
            mpu_uid.as_str(),
            format!("{MPU_BUCKET_PREFIX}{}", bucket.name),
            bucket.owner.as_str(),
        );
        if self.metadata.create_bucket(shadow).await? {
            debug!(mpu_bucket = %mpu_uid, "shadow bucket created");
        }

        ctx.checkpoint("overview write")?;
        let mut record = ObjectMetadata::new(now);
        record.user_metadata = user_metadata(request.headers);
        self.metadata
            .put_object(&mpu_uid, &overview.to_string(), record)
            .await?;

        info!(upload_id = %upload_id, "multipart upload initiated");
        Ok(upload_id)
    }

    /// Store one part and return its ETag (the hex MD5 of the body)
    pub async fn upload_part(
        &self,
        ctx: &RequestContext,
        request: UploadPartRequest<'_>,
    ) -> Result<String, GatewayError> {
        let span = info_span!(
            "upload_part",
            request_id = %ctx.request_id(),
            bucket_uid = request.upload.bucket_uid,
            key = request.upload.object_key,
            upload_id = request.upload.upload_id,
            part_number = request.part_number,
        );
        self.upload_part_inner(ctx, request).instrument(span).await
    }

    async fn upload_part_inner(
        &self,
        ctx: &RequestContext,
        request: UploadPartRequest<'_>,
    ) -> Result<String, GatewayError> {
        if !(1..=MAX_PART_NUMBER).contains(&request.part_number) {
            return Err(GatewayError::InvalidPartNumber(request.part_number));
        }
        let upload = request.upload;
        check_component(upload.object_key)?;

        let policy = self
            .policy(upload.access_key, upload.bucket_uid, upload.object_key)
            .await?;
        let _guard = self.lock_upload(ctx, &upload).await?;

        ctx.checkpoint("validation")?;
        let target = self.validate(&upload, RequestType::PutPart, policy).await?;

        ctx.checkpoint("data write")?;
        let write = write_payload(self.data.as_ref(), request.headers, request.body).await?;

        let key = PartKey::new(
            target.bucket.uid.as_str(),
            upload.object_key,
            upload.upload_id,
            request.part_number,
            write.content_md5.as_str(),
            write.location.clone(),
        )?;
        let raw_key = key.to_string();

        let superseded: Vec<String> = self
            .metadata
            .list_objects(
                &target.mpu_bucket.uid,
                &PartKey::part_prefix(
                    &target.bucket.uid,
                    upload.object_key,
                    upload.upload_id,
                    request.part_number,
                ),
            )
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .filter(|existing| *existing != raw_key)
            .collect();

        ctx.checkpoint("metadata write")?;
        let mut record = ObjectMetadata::new(Utc::now());
        record.content_length = write.content_length;
        record.content_md5 = write.content_md5.clone();
        record.locations = vec![write.location];
        self.metadata
            .put_object(&target.mpu_bucket.uid, &raw_key, record)
            .await?;

        if !superseded.is_empty() {
            ctx.checkpoint("superseded part cleanup")?;
            let locations = superseded
                .iter()
                .map(|raw| PartKey::parse(raw).map(|part| part.location))
                .collect::<Result<Vec<_>, _>>()?;
            self.data.delete(&locations).await?;
            self.metadata
                .batch_delete(&target.mpu_bucket.uid, &superseded)
                .await?;
            debug!(count = superseded.len(), "superseded part replaced");
        }

        info!(etag = %write.content_md5, "part stored");
        Ok(write.content_md5)
    }

    /// Parts of an open upload, ordered by part number
    pub async fn list_parts(
        &self,
        ctx: &RequestContext,
        upload: UploadRequest<'_>,
    ) -> Result<Vec<PartInfo>, GatewayError> {
        let span = info_span!(
            "list_parts",
            request_id = %ctx.request_id(),
            bucket_uid = upload.bucket_uid,
            upload_id = upload.upload_id,
        );
        self.list_parts_inner(ctx, upload).instrument(span).await
    }

    async fn list_parts_inner(
        &self,
        ctx: &RequestContext,
        upload: UploadRequest<'_>,
    ) -> Result<Vec<PartInfo>, GatewayError> {
        let policy = self
            .policy(upload.access_key, upload.bucket_uid, upload.object_key)
            .await?;
        let _guard = self.lock_upload(ctx, &upload).await?;

        ctx.checkpoint("validation")?;
        let target = self.validate(&upload, RequestType::ListParts, policy).await?;

        ctx.checkpoint("listing")?;
        let mut parts = self
            .metadata
            .list_objects(
                &target.mpu_bucket.uid,
                &PartKey::upload_prefix(&target.bucket.uid, upload.object_key, upload.upload_id),
            )
            .await?
            .into_iter()
            .map(|entry| -> Result<PartInfo, GatewayError> {
                let key = PartKey::parse(&entry.key)?;
                Ok(PartInfo {
                    part_number: key.part_number,
                    etag: key.md5,
                    size: entry.metadata.content_length,
                    last_modified: entry.metadata.last_modified,
                    location: key.location,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        parts.sort_by_key(|part| part.part_number);

        debug!(count = parts.len(), "parts listed");
        Ok(parts)
    }

    /// Abort an upload: delete every part's payload, then the part entries
    /// and the overview entry.
    ///
    /// Stages run strictly in order and the first failure is returned as-is.
    /// Payloads always go before metadata, so a failed data delete leaves the
    /// upload fully listed; no rollback is attempted.
    pub async fn delete_upload(
        &self,
        ctx: &RequestContext,
        upload: UploadRequest<'_>,
    ) -> Result<(), GatewayError> {
        let span = info_span!(
            "delete_upload",
            request_id = %ctx.request_id(),
            bucket_uid = upload.bucket_uid,
            key = upload.object_key,
            upload_id = upload.upload_id,
        );
        self.delete_upload_inner(ctx, upload).instrument(span).await
    }

    async fn delete_upload_inner(
        &self,
        ctx: &RequestContext,
        upload: UploadRequest<'_>,
    ) -> Result<(), GatewayError> {
        let policy = self
            .policy(upload.access_key, upload.bucket_uid, upload.object_key)
            .await?;

        let _guard = self.lock_upload(ctx, &upload).await?;
        ctx.checkpoint("validation")?;
        let target = self.validate(&upload, RequestType::DeleteMpu, policy).await?;
        let overview_tokens = target.overview_tokens();

        ctx.checkpoint("part listing")?;
        let part_keys: Vec<String> = self
            .metadata
            .list_objects(
                &target.mpu_bucket.uid,
                &PartKey::upload_prefix(&target.bucket.uid, upload.object_key, upload.upload_id),
            )
            .await?
            .into_iter()
            .map(|entry| entry.key)
            .collect();

        let locations = part_keys
            .iter()
            .map(|raw| PartKey::parse(raw).map(|part| part.location))
            .collect::<Result<Vec<_>, _>>()?;

        ctx.checkpoint("data delete")?;
        if let Err(err) = self.data.delete(&locations).await {
            warn!(error = %err, parts = locations.len(), "part data delete failed");
            return Err(err.into());
        }
        debug!(parts = locations.len(), "part data deleted");

        ctx.checkpoint("metadata delete")?;
        let mut keys = part_keys;
        keys.push(overview_tokens.join(DELIMITER));
        self.metadata
            .batch_delete(&target.mpu_bucket.uid, &keys)
            .await?;

        info!(keys = keys.len(), "multipart upload deleted");
        Ok(())
    }

    async fn policy(
        &self,
        access_key: &str,
        bucket_uid: &str,
        object_key: &str,
    ) -> Result<PolicyDecision, GatewayError> {
        self.auth
            .check_bucket_policies(&PolicyRequest {
                access_key,
                bucket_uid,
                object_key: Some(object_key),
            })
            .await
    }

    async fn lock_upload(
        &self,
        ctx: &RequestContext,
        upload: &UploadRequest<'_>,
    ) -> Result<ResourceGuard, GatewayError> {
        ctx.lock(
            &self.locks,
            ResourceKey::upload(upload.bucket_uid, upload.upload_id),
        )
        .await
    }

    async fn validate(
        &self,
        upload: &UploadRequest<'_>,
        request_type: RequestType,
        policy: PolicyDecision,
    ) -> Result<MultipartTarget, GatewayError> {
        let params = ValidationParams::new(upload.access_key, upload.bucket_uid, request_type)
            .with_policy(policy);
        self.validator
            .validate_multipart(&params, upload.object_key, upload.upload_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoBucketPolicies;
    use crate::storage::{EphemeralDataStore, EphemeralMetadataStore};
    use http::HeaderValue;

    struct Fixture {
        metadata: Arc<EphemeralMetadataStore>,
        data: Arc<EphemeralDataStore>,
        coordinator: MultipartUploadCoordinator,
    }

    async fn fixture() -> Fixture {
        let metadata = Arc::new(EphemeralMetadataStore::new());
        let data = Arc::new(EphemeralDataStore::new());
        metadata
            .create_bucket(Bucket::new("uid-b1", "b1", "A"))
            .await
            .unwrap();

        let auth = AuthorizationService::new(metadata.clone(), Arc::new(NoBucketPolicies));
        let validator = MetadataValidator::new(metadata.clone(), auth.clone());
        let coordinator = MultipartUploadCoordinator::new(
            metadata.clone(),
            data.clone(),
            LockTable::new(),
            auth,
            validator,
        );
        Fixture {
            metadata,
            data,
            coordinator,
        }
    }

    async fn initiate(f: &Fixture) -> String {
        let headers = HeaderMap::new();
        f.coordinator
            .initiate_upload(
                &RequestContext::new(),
                InitiateUploadRequest {
                    access_key: "A",
                    bucket_uid: "uid-b1",
                    object_key: "obj",
                    headers: &headers,
                },
            )
            .await
            .unwrap()
    }

    fn upload<'a>(access_key: &'a str, upload_id: &'a str) -> UploadRequest<'a> {
        UploadRequest {
            access_key,
            bucket_uid: "uid-b1",
            object_key: "obj",
            upload_id,
        }
    }

    async fn put_part(
        f: &Fixture,
        upload_id: &str,
        part_number: u32,
        body: &'static str,
    ) -> Result<String, GatewayError> {
        let headers = HeaderMap::new();
        f.coordinator
            .upload_part(
                &RequestContext::new(),
                UploadPartRequest {
                    upload: upload("A", upload_id),
                    part_number,
                    headers: &headers,
                    body: Bytes::from(body),
                },
            )
            .await
    }

    #[tokio::test]
    async fn test_initiate_creates_shadow_bucket_and_overview() {
        let f = fixture().await;
        let upload_id = initiate(&f).await;

        let shadow = f
            .metadata
            .get_bucket(&mpu_bucket_uid("uid-b1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shadow.name, "mpuShadowBucketb1");
        assert_eq!(shadow.owner, "A");

        let entries = f
            .metadata
            .list_objects(&shadow.uid, &OverviewKey::upload_prefix("obj", &upload_id))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        let overview = OverviewKey::parse(&entries[0].key).unwrap();
        assert_eq!(overview.initiator, "A");
        assert_eq!(overview.upload_id, upload_id);
    }

    #[tokio::test]
    async fn test_second_initiate_reuses_shadow_bucket() {
        let f = fixture().await;
        let first = initiate(&f).await;
        let second = initiate(&f).await;
        assert_ne!(first, second);

        let overviews = f
            .metadata
            .list_objects(&mpu_bucket_uid("uid-b1"), "overview")
            .await
            .unwrap();
        assert_eq!(overviews.len(), 2);
    }

    #[tokio::test]
    async fn test_initiate_denied_for_non_owner() {
        let f = fixture().await;
        let headers = HeaderMap::new();
        let err = f
            .coordinator
            .initiate_upload(
                &RequestContext::new(),
                InitiateUploadRequest {
                    access_key: "B",
                    bucket_uid: "uid-b1",
                    object_key: "obj",
                    headers: &headers,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ActionNotPermitted { .. }));
        assert!(f
            .metadata
            .get_bucket(&mpu_bucket_uid("uid-b1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_upload_and_list_parts_in_order() {
        let f = fixture().await;
        let upload_id = initiate(&f).await;

        put_part(&f, &upload_id, 10, "ten").await.unwrap();
        put_part(&f, &upload_id, 2, "two").await.unwrap();
        let etag = put_part(&f, &upload_id, 1, "hello").await.unwrap();
        assert_eq!(etag, "5d41402abc4b2a76b9719d911017c592");

        let parts = f
            .coordinator
            .list_parts(&RequestContext::new(), upload("A", &upload_id))
            .await
            .unwrap();
        let numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 10]);
        assert_eq!(parts[0].etag, etag);
        assert_eq!(parts[0].size, 5);
        assert_eq!(
            f.data.get(&parts[0].location).await.unwrap().unwrap(),
            Bytes::from("hello")
        );
    }

    #[tokio::test]
    async fn test_reupload_replaces_part() {
        let f = fixture().await;
        let upload_id = initiate(&f).await;

        put_part(&f, &upload_id, 1, "first").await.unwrap();
        put_part(&f, &upload_id, 1, "second").await.unwrap();

        let parts = f
            .coordinator
            .list_parts(&RequestContext::new(), upload("A", &upload_id))
            .await
            .unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].size, 6);
        assert_eq!(f.data.len(), 1);
    }

    #[tokio::test]
    async fn test_part_number_bounds() {
        let f = fixture().await;
        let upload_id = initiate(&f).await;

        assert!(matches!(
            put_part(&f, &upload_id, 0, "x").await,
            Err(GatewayError::InvalidPartNumber(0))
        ));
        assert!(matches!(
            put_part(&f, &upload_id, MAX_PART_NUMBER + 1, "x").await,
            Err(GatewayError::InvalidPartNumber(_))
        ));
        assert!(put_part(&f, &upload_id, MAX_PART_NUMBER, "x").await.is_ok());
    }

    #[tokio::test]
    async fn test_part_into_unknown_upload() {
        let f = fixture().await;
        initiate(&f).await;
        let err = put_part(&f, "missing", 1, "x").await.unwrap_err();
        assert!(matches!(err, GatewayError::UploadNotFound(_)));
        assert!(f.data.is_empty());
    }

    #[tokio::test]
    async fn test_part_md5_mismatch() {
        let f = fixture().await;
        let upload_id = initiate(&f).await;
        let mut headers = HeaderMap::new();
        headers.insert("content-md5", HeaderValue::from_static("XUFAKrxLKna5cZ2REBfFkg=="));

        let err = f
            .coordinator
            .upload_part(
                &RequestContext::new(),
                UploadPartRequest {
                    upload: upload("A", &upload_id),
                    part_number: 1,
                    headers: &headers,
                    body: Bytes::from("other"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ContentMd5Invalid { .. }));
        assert!(f.data.is_empty());
    }

    #[tokio::test]
    async fn test_delete_upload_removes_everything() {
        let f = fixture().await;
        let upload_id = initiate(&f).await;
        put_part(&f, &upload_id, 1, "p1").await.unwrap();
        put_part(&f, &upload_id, 2, "p2").await.unwrap();
        assert_eq!(f.data.len(), 2);

        f.coordinator
            .delete_upload(&RequestContext::new(), upload("A", &upload_id))
            .await
            .unwrap();

        assert!(f.data.is_empty());
        let remaining = f
            .metadata
            .list_objects(&mpu_bucket_uid("uid-b1"), "")
            .await
            .unwrap();
        assert!(remaining.is_empty());

        let err = f
            .coordinator
            .list_parts(&RequestContext::new(), upload("A", &upload_id))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UploadNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_upload_without_parts() {
        let f = fixture().await;
        let upload_id = initiate(&f).await;

        f.coordinator
            .delete_upload(&RequestContext::new(), upload("A", &upload_id))
            .await
            .unwrap();
        assert!(f
            .metadata
            .list_objects(&mpu_bucket_uid("uid-b1"), "")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_upload_leaves_other_uploads() {
        let f = fixture().await;
        let keep = initiate(&f).await;
        let discard = initiate(&f).await;
        put_part(&f, &keep, 1, "keep").await.unwrap();
        put_part(&f, &discard, 1, "discard").await.unwrap();

        f.coordinator
            .delete_upload(&RequestContext::new(), upload("A", &discard))
            .await
            .unwrap();

        let parts = f
            .coordinator
            .list_parts(&RequestContext::new(), upload("A", &keep))
            .await
            .unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(f.data.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_upload_denied_for_non_owner() {
        let f = fixture().await;
        let upload_id = initiate(&f).await;
        put_part(&f, &upload_id, 1, "p1").await.unwrap();

        let err = f
            .coordinator
            .delete_upload(&RequestContext::new(), upload("B", &upload_id))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ActionNotPermitted { .. }));
        assert_eq!(f.data.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_upload_cancelled_before_any_delete() {
        let f = fixture().await;
        let upload_id = initiate(&f).await;
        put_part(&f, &upload_id, 1, "p1").await.unwrap();

        let ctx = RequestContext::new().with_deadline(tokio::time::Instant::now());
        let err = f
            .coordinator
            .delete_upload(&ctx, upload("A", &upload_id))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled { .. }));
        assert_eq!(f.data.len(), 1);
    }
}
