//! Error codes and classification

use std::fmt;

/// Broad failure classes used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bucket, object or upload absent
    NotFound,
    /// Authorization or policy failure
    PermissionDenied,
    /// Resource already exists
    Conflict,
    /// Content hash mismatch
    Integrity,
    /// Metadata or data store failure
    Upstream,
    /// Feature reserved but not implemented
    Unsupported,
    /// Request deadline passed
    Cancelled,
    /// Malformed request parameter
    InvalidRequest,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::PermissionDenied => "PermissionDenied",
            Self::Conflict => "Conflict",
            Self::Integrity => "Integrity",
            Self::Upstream => "Upstream",
            Self::Unsupported => "Unsupported",
            Self::Cancelled => "Cancelled",
            Self::InvalidRequest => "InvalidRequest",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes surfaced to the API layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BucketAlreadyExists,
    BucketNotFound,
    ActionNotPermitted,
    ContentMd5Invalid,
    NoSuchUpload,
    NotImplemented,
    RequestTimeout,
    InvalidArgument,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BucketAlreadyExists => "BucketAlreadyExists",
            Self::BucketNotFound => "BucketNotFound",
            Self::ActionNotPermitted => "ActionNotPermitted",
            Self::ContentMd5Invalid => "ContentMD5Invalid",
            Self::NoSuchUpload => "NoSuchUpload",
            Self::NotImplemented => "NotImplemented",
            Self::RequestTimeout => "RequestTimeout",
            Self::InvalidArgument => "InvalidArgument",
            Self::InternalError => "InternalError",
        }
    }

    /// The failure class this code belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BucketNotFound | Self::NoSuchUpload => ErrorKind::NotFound,
            Self::ActionNotPermitted => ErrorKind::PermissionDenied,
            Self::BucketAlreadyExists => ErrorKind::Conflict,
            Self::ContentMd5Invalid => ErrorKind::Integrity,
            Self::NotImplemented => ErrorKind::Unsupported,
            Self::RequestTimeout => ErrorKind::Cancelled,
            Self::InvalidArgument => ErrorKind::InvalidRequest,
            Self::InternalError => ErrorKind::Upstream,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
