//! Gateway service: stores, locks and coordinators wired together

use crate::auth::{AuthorizationService, NoBucketPolicies, PolicyEvaluator};
use crate::bucket::BucketLifecycleManager;
use crate::config::GatewayConfig;
use crate::context::RequestContext;
use crate::keys::resource_uid;
use crate::multipart::MultipartUploadCoordinator;
use crate::object::ObjectWriteCoordinator;
use crate::storage::{DataStore, EphemeralDataStore, EphemeralMetadataStore, MetadataStore};
use crate::validator::MetadataValidator;
use metagate_core::{LockTable, RequestId};
use std::sync::Arc;

/// Metadata gateway
///
/// Every coordinator shares the same store handles and lock table, so
/// requests issued through one `Gateway` serialize per resource.
#[derive(Clone)]
pub struct Gateway {
    config: GatewayConfig,
    metadata: Arc<dyn MetadataStore>,
    data: Arc<dyn DataStore>,
    locks: LockTable,
    auth: AuthorizationService,
    validator: MetadataValidator,
    buckets: BucketLifecycleManager,
    objects: ObjectWriteCoordinator,
    multipart: MultipartUploadCoordinator,
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

impl Gateway {
    /// Create a gateway with ephemeral stores and no bucket policies
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_backends(
            config,
            Arc::new(EphemeralMetadataStore::new()),
            Arc::new(EphemeralDataStore::new()),
            Arc::new(NoBucketPolicies),
        )
    }

    /// Create a gateway over custom store backends
    pub fn with_backends(
        config: GatewayConfig,
        metadata: Arc<dyn MetadataStore>,
        data: Arc<dyn DataStore>,
        policies: Arc<dyn PolicyEvaluator>,
    ) -> Self {
        let locks = LockTable::new();
        let auth = AuthorizationService::new(metadata.clone(), policies);
        let validator = MetadataValidator::new(metadata.clone(), auth.clone());

        let buckets = BucketLifecycleManager::new(metadata.clone(), locks.clone());
        let objects = ObjectWriteCoordinator::new(
            metadata.clone(),
            data.clone(),
            locks.clone(),
            auth.clone(),
            validator.clone(),
        );
        let multipart = MultipartUploadCoordinator::new(
            metadata.clone(),
            data.clone(),
            locks.clone(),
            auth.clone(),
            validator.clone(),
        );

        Self {
            config,
            metadata,
            data,
            locks,
            auth,
            validator,
            buckets,
            objects,
            multipart,
        }
    }

    /// A fresh request context carrying the configured default deadline
    pub fn context(&self) -> RequestContext {
        let ctx = RequestContext::new().with_request_id(RequestId::new());
        match self.config.request_timeout() {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }

    /// UID of the named bucket within the configured namespace
    pub fn bucket_uid(&self, bucket_name: &str) -> String {
        resource_uid(&self.config.namespace, bucket_name)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn data(&self) -> &Arc<dyn DataStore> {
        &self.data
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn auth(&self) -> &AuthorizationService {
        &self.auth
    }

    pub fn validator(&self) -> &MetadataValidator {
        &self.validator
    }

    pub fn buckets(&self) -> &BucketLifecycleManager {
        &self.buckets
    }

    pub fn objects(&self) -> &ObjectWriteCoordinator {
        &self.objects
    }

    pub fn multipart(&self) -> &MultipartUploadCoordinator {
        &self.multipart
    }
}
