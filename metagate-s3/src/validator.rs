//! Request gate: resolves the target bucket and checks authorization
//!
//! Validation never mutates. It resolves the bucket, applies the ownership
//! check unless a bucket policy already granted access, and reports the state
//! of the targeted object or upload so callers can choose create-vs-merge.

use crate::auth::{AuthorizationService, PolicyDecision};
use crate::error::GatewayError;
use crate::keys::{mpu_bucket_uid, OverviewKey};
use crate::storage::{Bucket, MetadataStore, ObjectMetadata};
use std::sync::Arc;
use tracing::debug;

/// The kind of request being validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    PutObject,
    InitiateMpu,
    PutPart,
    ListParts,
    DeleteMpu,
}

#[derive(Debug, Clone, Copy)]
pub struct ValidationParams<'a> {
    pub access_key: &'a str,
    pub bucket_uid: &'a str,
    pub request_type: RequestType,
    pub policy: PolicyDecision,
}

impl<'a> ValidationParams<'a> {
    pub fn new(access_key: &'a str, bucket_uid: &'a str, request_type: RequestType) -> Self {
        Self {
            access_key,
            bucket_uid,
            request_type,
            policy: PolicyDecision::Neutral,
        }
    }

    pub fn with_policy(mut self, policy: PolicyDecision) -> Self {
        self.policy = policy;
        self
    }

    /// Whether a bucket policy lets this request skip the ownership check
    pub fn policy_go_ahead(&self) -> bool {
        self.policy == PolicyDecision::AccessGranted
    }
}

/// Whether the targeted object already exists
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectState {
    Exists(Box<ObjectMetadata>),
    Absent,
}

impl ObjectState {
    pub fn exists(&self) -> bool {
        matches!(self, Self::Exists(_))
    }
}

/// Resolved multipart upload
#[derive(Debug, Clone)]
pub struct MultipartTarget {
    pub bucket: Bucket,
    /// Shadow bucket holding the overview and part records
    pub mpu_bucket: Bucket,
    pub overview: OverviewKey,
}

impl MultipartTarget {
    /// The overview's ordered token sequence
    pub fn overview_tokens(&self) -> Vec<String> {
        self.overview.tokens()
    }
}

#[derive(Clone)]
pub struct MetadataValidator {
    metadata: Arc<dyn MetadataStore>,
    auth: AuthorizationService,
}

impl MetadataValidator {
    pub fn new(metadata: Arc<dyn MetadataStore>, auth: AuthorizationService) -> Self {
        Self { metadata, auth }
    }

    /// Resolve and authorize the bucket only
    pub async fn validate_bucket(&self, params: &ValidationParams<'_>) -> Result<Bucket, GatewayError> {
        let bucket = self
            .metadata
            .get_bucket(params.bucket_uid)
            .await?
            .ok_or_else(|| GatewayError::BucketNotFound(params.bucket_uid.to_string()))?;

        if !params.policy_go_ahead() && !self.auth.is_owner(&bucket, params.access_key) {
            debug!(
                bucket_uid = params.bucket_uid,
                access_key = params.access_key,
                request_type = ?params.request_type,
                "ownership check failed"
            );
            return Err(GatewayError::ActionNotPermitted {
                access_key: params.access_key.to_string(),
                bucket: bucket.name,
            });
        }

        Ok(bucket)
    }

    /// Resolve the bucket and report whether `object_key` exists in it
    pub async fn validate_object(
        &self,
        params: &ValidationParams<'_>,
        object_key: &str,
    ) -> Result<(Bucket, ObjectState), GatewayError> {
        let bucket = self.validate_bucket(params).await?;
        let state = match self.metadata.get_object(&bucket.uid, object_key).await? {
            Some(existing) => ObjectState::Exists(Box::new(existing)),
            None => ObjectState::Absent,
        };
        Ok((bucket, state))
    }

    /// Resolve the bucket, its shadow bucket and the open upload's overview
    pub async fn validate_multipart(
        &self,
        params: &ValidationParams<'_>,
        object_key: &str,
        upload_id: &str,
    ) -> Result<MultipartTarget, GatewayError> {
        let bucket = self.validate_bucket(params).await?;
        let not_found = || GatewayError::UploadNotFound(upload_id.to_string());

        let mpu_bucket = self
            .metadata
            .get_bucket(&mpu_bucket_uid(&bucket.uid))
            .await?
            .ok_or_else(not_found)?;

        let prefix = OverviewKey::upload_prefix(object_key, upload_id);
        let entry = self
            .metadata
            .list_objects(&mpu_bucket.uid, &prefix)
            .await?
            .into_iter()
            .next()
            .ok_or_else(not_found)?;
        let overview = OverviewKey::parse(&entry.key)?;

        Ok(MultipartTarget {
            bucket,
            mpu_bucket,
            overview,
        })
    }
}
