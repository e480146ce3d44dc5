//! Object writes: integrity check, payload write, metadata merge
//!
//! Bytes are always written before the metadata that references them, so a
//! failure between the two leaves at worst an unreferenced payload rather
//! than a record pointing at nothing.

use crate::auth::{AuthorizationService, PolicyRequest};
use crate::checksum::{compute_md5, verify_content_md5};
use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::storage::{DataStore, Location, MetadataStore, ObjectMetadata, ReservedFields};
use crate::validator::{MetadataValidator, ObjectState, RequestType, ValidationParams};
use bytes::Bytes;
use chrono::Utc;
use http::HeaderMap;
use metagate_core::{LockTable, ResourceKey};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

const USER_METADATA_PREFIX: &str = "x-amz-meta-";

const SSE_HEADERS: [&str; 2] = [
    "x-amz-server-side-encryption",
    "x-amz-server-side-encryption-customer-algorithm",
];

#[derive(Debug, Clone)]
pub struct PutObjectRequest<'a> {
    pub access_key: &'a str,
    pub bucket_uid: &'a str,
    pub object_key: &'a str,
    pub headers: &'a HeaderMap,
    pub body: Bytes,
}

/// Outcome of the payload write, input to the metadata stage
#[derive(Debug, Clone)]
pub struct DataWrite {
    pub location: Location,
    pub content_length: u64,
    pub content_md5: String,
}

/// Collect every `x-amz-meta-*` header, keyed without the prefix
pub fn user_metadata(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(USER_METADATA_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Check the declared Content-MD5 and store the body. Nothing is written
/// when the digests disagree.
pub(crate) async fn write_payload(
    data: &dyn DataStore,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<DataWrite, GatewayError> {
    let content_md5 = compute_md5(&body);
    verify_content_md5(headers, &content_md5)?;

    let content_length = body.len() as u64;
    let location = data.put(body).await?;
    if location.is_empty() {
        return Err(GatewayError::MissingLocation);
    }

    debug!(%location, content_length, "payload stored");
    Ok(DataWrite {
        location,
        content_length,
        content_md5,
    })
}

/// Server-side encryption has a schema slot but no implementation
pub(crate) fn reject_server_side_encryption(headers: &HeaderMap) -> Result<(), GatewayError> {
    if SSE_HEADERS.iter().any(|name| headers.contains_key(*name)) {
        return Err(GatewayError::NotImplemented("server-side encryption"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ObjectWriteCoordinator {
    metadata: Arc<dyn MetadataStore>,
    data: Arc<dyn DataStore>,
    locks: LockTable,
    auth: AuthorizationService,
    validator: MetadataValidator,
}

impl ObjectWriteCoordinator {
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

    /// Store an object and return its content MD5
    pub async fn put_object(
        &self,
        ctx: &RequestContext,
        request: PutObjectRequest<'_>,
    ) -> Result<String, GatewayError> {
        let span = info_span!(
            "put_object",
            request_id = %ctx.request_id(),
            bucket_uid = request.bucket_uid,
            key = request.object_key,
        );
        self.put_object_inner(ctx, request).instrument(span).await
    }

    async fn put_object_inner(
        &self,
        ctx: &RequestContext,
        request: PutObjectRequest<'_>,
    ) -> Result<String, GatewayError> {
        reject_server_side_encryption(request.headers)?;

        let policy = self
            .auth
            .check_bucket_policies(&PolicyRequest {
                access_key: request.access_key,
                bucket_uid: request.bucket_uid,
                object_key: Some(request.object_key),
            })
            .await?;

        let _guard = ctx
            .lock(
                &self.locks,
                ResourceKey::object(request.bucket_uid, request.object_key),
            )
            .await?;

        ctx.checkpoint("validation")?;
        let params =
            ValidationParams::new(request.access_key, request.bucket_uid, RequestType::PutObject)
                .with_policy(policy);
        let (bucket, state) = self.validator.validate_object(&params, request.object_key).await?;

        ctx.checkpoint("data write")?;
        let write = self.store_data(request.headers, request.body).await?;

        ctx.checkpoint("metadata write")?;
        let superseded = match &state {
            ObjectState::Exists(existing) => existing.locations.clone(),
            ObjectState::Absent => Vec::new(),
        };
        let content_md5 = self
            .store_metadata(
                &bucket.uid,
                request.object_key,
                state,
                write,
                user_metadata(request.headers),
            )
            .await?;

        if !superseded.is_empty() {
            ctx.checkpoint("superseded data cleanup")?;
            self.data.delete(&superseded).await?;
            debug!(count = superseded.len(), "superseded payload deleted");
        }

        Ok(content_md5)
    }

    /// Verify the declared digest, then write the payload
    pub async fn store_data(
        &self,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<DataWrite, GatewayError> {
        write_payload(self.data.as_ref(), headers, body).await
    }

    /// Create or merge the object's record and persist it
    pub async fn store_metadata(
        &self,
        bucket_uid: &str,
        object_key: &str,
        state: ObjectState,
        write: DataWrite,
        user_metadata: BTreeMap<String, String>,
    ) -> Result<String, GatewayError> {
        let now = Utc::now();
        let mut record = match state {
            ObjectState::Exists(existing) => *existing,
            ObjectState::Absent => ObjectMetadata::new(now),
        };

        record.content_length = write.content_length;
        record.last_modified = now;
        record.content_md5 = write.content_md5;
        record.reserved = ReservedFields::default();
        record.locations = vec![write.location];
        record.user_metadata.extend(user_metadata);

        let content_md5 = record.content_md5.clone();
        self.metadata.put_object(bucket_uid, object_key, record).await?;

        info!(content_md5 = %content_md5, "object metadata stored");
        Ok(content_md5)
    }
}
