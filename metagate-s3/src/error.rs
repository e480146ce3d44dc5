//! Errors surfaced by the coordinators

use crate::storage::StoreError;
use metagate_core::{ErrorCode, ErrorKind};
use thiserror::Error;

/// Error returned from every coordinator pipeline.
///
/// Store failures are carried through untouched in [`GatewayError::Store`].
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("Bucket does not exist: {0}")]
    BucketNotFound(String),

    #[error("Action not permitted: {access_key} on {bucket}")]
    ActionNotPermitted { access_key: String, bucket: String },

    #[error("Content-MD5 is invalid: declared {declared}, computed {computed}")]
    ContentMd5Invalid { declared: String, computed: String },

    #[error("Upload not found: {0}")]
    UploadNotFound(String),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Invalid part number: {0}")]
    InvalidPartNumber(u32),

    #[error("Name component contains the reserved delimiter: {0}")]
    ReservedDelimiter(String),

    #[error("Malformed composite key: {0}")]
    MalformedKey(String),

    #[error("Data store returned no location")]
    MissingLocation,

    #[error("Request {request_id} cancelled before {stage}")]
    Cancelled {
        request_id: String,
        stage: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GatewayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BucketAlreadyExists(_) => ErrorCode::BucketAlreadyExists,
            Self::BucketNotFound(_) => ErrorCode::BucketNotFound,
            Self::ActionNotPermitted { .. } => ErrorCode::ActionNotPermitted,
            Self::ContentMd5Invalid { .. } => ErrorCode::ContentMd5Invalid,
            Self::UploadNotFound(_) => ErrorCode::NoSuchUpload,
            Self::NotImplemented(_) => ErrorCode::NotImplemented,
            Self::InvalidPartNumber(_) | Self::ReservedDelimiter(_) => ErrorCode::InvalidArgument,
            Self::Cancelled { .. } => ErrorCode::RequestTimeout,
            Self::MalformedKey(_) | Self::MissingLocation | Self::Store(_) => {
                ErrorCode::InternalError
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code().kind()
    }
}
