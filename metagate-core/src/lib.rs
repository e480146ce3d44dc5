//! Core types for metagate
//!
//! This crate provides the error taxonomy, request identifiers and the
//! per-resource lock table shared by the gateway crates.

pub mod error;
pub mod locks;
pub mod request_id;

pub use error::{ErrorCode, ErrorKind};
pub use locks::{LockTable, ResourceGuard, ResourceKey};
pub use request_id::RequestId;
