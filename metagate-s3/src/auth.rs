//! Bucket existence and ownership authorization
//!
//! Ownership is the only authorization rule: a requester may act on a bucket
//! iff they own it. Bucket policies are consulted through the
//! [`PolicyEvaluator`] seam and can only widen access, by returning
//! [`PolicyDecision::AccessGranted`].

use crate::error::GatewayError;
use crate::keys::MPU_BUCKET_PREFIX;
use crate::storage::{Bucket, MetadataStore};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Result of a policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Skip the ownership check downstream
    AccessGranted,
    /// No opinion; the ownership check applies
    Neutral,
}

/// Combined existence and authorization status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Ok,
    NotFound,
    PermissionDenied,
}

/// What a policy is asked about
#[derive(Debug, Clone, Copy)]
pub struct PolicyRequest<'a> {
    pub access_key: &'a str,
    pub bucket_uid: &'a str,
    pub object_key: Option<&'a str>,
}

/// Extension point for bucket policy evaluation
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(&self, request: &PolicyRequest<'_>) -> Result<PolicyDecision, GatewayError>;
}

/// Evaluator used when no policies are configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBucketPolicies;

#[async_trait]
impl PolicyEvaluator for NoBucketPolicies {
    async fn evaluate(&self, _request: &PolicyRequest<'_>) -> Result<PolicyDecision, GatewayError> {
        Ok(PolicyDecision::Neutral)
    }
}

/// Fixed allow-list of access keys per bucket UID
#[derive(Debug, Default, Clone)]
pub struct StaticBucketPolicies {
    allowed: HashMap<String, HashSet<String>>,
}

impl StaticBucketPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, bucket_uid: impl Into<String>, access_key: impl Into<String>) -> Self {
        self.allowed
            .entry(bucket_uid.into())
            .or_default()
            .insert(access_key.into());
        self
    }
}

#[async_trait]
impl PolicyEvaluator for StaticBucketPolicies {
    async fn evaluate(&self, request: &PolicyRequest<'_>) -> Result<PolicyDecision, GatewayError> {
        let granted = self
            .allowed
            .get(request.bucket_uid)
            .is_some_and(|keys| keys.contains(request.access_key));
        Ok(if granted {
            PolicyDecision::AccessGranted
        } else {
            PolicyDecision::Neutral
        })
    }
}

/// Resolves bucket existence and evaluates owner/policy authorization
#[derive(Clone)]
pub struct AuthorizationService {
    metadata: Arc<dyn MetadataStore>,
    policies: Arc<dyn PolicyEvaluator>,
}

impl AuthorizationService {
    pub fn new(metadata: Arc<dyn MetadataStore>, policies: Arc<dyn PolicyEvaluator>) -> Self {
        Self { metadata, policies }
    }

    /// Whether any bucket in the namespace has this name
    pub async fn bucket_exists(&self, bucket_name: &str) -> Result<bool, GatewayError> {
        Ok(self.find_by_name(bucket_name).await?.is_some())
    }

    /// Whether `access_key` may act on the named bucket.
    ///
    /// The object key is accepted for future per-object rules; today only
    /// bucket ownership counts, and ACL grants are not consulted.
    pub async fn is_user_authorized(
        &self,
        access_key: &str,
        bucket_name: &str,
        _object_key: Option<&str>,
    ) -> Result<bool, GatewayError> {
        Ok(self
            .find_by_name(bucket_name)
            .await?
            .is_some_and(|bucket| self.is_owner(&bucket, access_key)))
    }

    pub async fn bucket_exists_and_user_authorized(
        &self,
        access_key: &str,
        bucket_name: &str,
    ) -> Result<AccessStatus, GatewayError> {
        let status = match self.find_by_name(bucket_name).await? {
            None => AccessStatus::NotFound,
            Some(bucket) if self.is_owner(&bucket, access_key) => AccessStatus::Ok,
            Some(_) => AccessStatus::PermissionDenied,
        };
        debug!(bucket = bucket_name, access_key, ?status, "bucket access checked");
        Ok(status)
    }

    pub async fn check_bucket_policies(
        &self,
        request: &PolicyRequest<'_>,
    ) -> Result<PolicyDecision, GatewayError> {
        let decision = self.policies.evaluate(request).await?;
        debug!(
            bucket_uid = request.bucket_uid,
            access_key = request.access_key,
            ?decision,
            "bucket policies evaluated"
        );
        Ok(decision)
    }

    /// Whether `access_key` owns `bucket`. Grant lists are not consulted.
    pub fn is_owner(&self, bucket: &Bucket, access_key: &str) -> bool {
        bucket.owner == access_key
    }

    /// Shadow buckets are internal and never match a client-facing name
    async fn find_by_name(&self, bucket_name: &str) -> Result<Option<Bucket>, GatewayError> {
        Ok(self
            .metadata
            .list_buckets()
            .await?
            .into_iter()
            .filter(|bucket| !bucket.uid.starts_with(MPU_BUCKET_PREFIX))
            .find(|bucket| bucket.name == bucket_name))
    }
}
