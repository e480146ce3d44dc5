//! Per-request context: identifier and optional deadline
//!
//! Coordinators call [`RequestContext::checkpoint`] between pipeline stages.
//! Once the deadline has passed the next checkpoint fails with
//! [`GatewayError::Cancelled`]; stages that already completed stay committed.

use crate::error::GatewayError;
use metagate_core::{LockTable, RequestId, ResourceGuard, ResourceKey};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    request_id: RequestId,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail if the deadline has passed before `stage` starts
    pub fn checkpoint(&self, stage: &'static str) -> Result<(), GatewayError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(self.cancelled(stage)),
            _ => Ok(()),
        }
    }

    /// Acquire the guard for `key`, giving up when the deadline passes
    pub async fn lock(
        &self,
        locks: &LockTable,
        key: ResourceKey,
    ) -> Result<ResourceGuard, GatewayError> {
        self.checkpoint("lock")?;
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, locks.lock(key))
                .await
                .map_err(|_| self.cancelled("lock")),
            None => Ok(locks.lock(key).await),
        }
    }

    fn cancelled(&self, stage: &'static str) -> GatewayError {
        GatewayError::Cancelled {
            request_id: self.request_id.id.clone(),
            stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_deadline_never_cancels() {
        let ctx = RequestContext::new();
        assert!(ctx.checkpoint("anything").is_ok());
    }

    #[tokio::test]
    async fn test_expired_deadline_cancels() {
        let ctx = RequestContext::new()
            .with_request_id(RequestId::with_id("req-1"))
            .with_deadline(Instant::now());

        let err = ctx.checkpoint("data").unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Cancelled { ref request_id, stage: "data" } if request_id == "req-1"
        ));
    }

    #[tokio::test]
    async fn test_lock_wait_respects_deadline() {
        let locks = LockTable::new();
        let _held = locks.lock(ResourceKey::bucket("b1")).await;

        let ctx = RequestContext::new().with_timeout(Duration::from_millis(20));
        let err = ctx.lock(&locks, ResourceKey::bucket("b1")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled { stage: "lock", .. }));
    }

    #[tokio::test]
    async fn test_lock_without_contention() {
        let locks = LockTable::new();
        let ctx = RequestContext::new().with_timeout(Duration::from_secs(5));
        let guard = ctx.lock(&locks, ResourceKey::bucket("b1")).await.unwrap();
        assert_eq!(guard.key(), &ResourceKey::bucket("b1"));
    }
}
