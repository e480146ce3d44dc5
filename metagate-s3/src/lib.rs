//! S3 metadata gateway
//!
//! Coordinates bucket creation, object writes and multipart uploads over a
//! metadata store and a data store, enforcing ownership and keeping payloads
//! and the records that reference them consistent.

pub mod acl;
pub mod auth;
pub mod bucket;
pub mod checksum;
pub mod config;
pub mod context;
pub mod error;
pub mod keys;
pub mod multipart;
pub mod object;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod validator;

pub use config::GatewayConfig;
pub use context::RequestContext;
pub use error::GatewayError;
pub use service::Gateway;
