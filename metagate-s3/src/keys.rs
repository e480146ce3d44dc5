//! Composite keys linking metadata records to data locations
//!
//! Part records and upload overviews live in a per-bucket shadow bucket and
//! are keyed by identity fields joined with [`DELIMITER`]. The field order is
//! part of the stored format and must not change:
//!
//! ```text
//! part:     bucketUID ..|.. objectKey ..|.. uploadId ..|.. partNumber ..|.. partMd5 ..|.. location
//! overview: overview  ..|.. objectKey ..|.. uploadId ..|.. initiator  ..|.. initiated
//! ```

use crate::error::GatewayError;
use crate::storage::Location;
use md5::{Digest, Md5};
use std::fmt;

/// Reserved separator between composite key fields
pub const DELIMITER: &str = "..|..";

/// Prefix of the shadow bucket holding in-progress uploads for a bucket
pub const MPU_BUCKET_PREFIX: &str = "mpuShadowBucket";

/// Position of the data location token in a part key
pub const LOCATION_FIELD: usize = 5;

const PART_FIELDS: usize = 6;
const OVERVIEW_FIELDS: usize = 5;
const OVERVIEW_TAG: &str = "overview";

/// Derive a resource UID from a namespace and a name
pub fn resource_uid(namespace: &str, name: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(namespace.as_bytes());
    hasher.update(name.as_bytes());
    hex::encode(hasher.finalize())
}

/// UID of the shadow bucket that tracks uploads into `bucket_uid`
pub fn mpu_bucket_uid(bucket_uid: &str) -> String {
    format!("{MPU_BUCKET_PREFIX}{bucket_uid}")
}

/// Reject a name component that would corrupt a composite key
pub fn check_component(value: &str) -> Result<(), GatewayError> {
    if value.contains(DELIMITER) {
        return Err(GatewayError::ReservedDelimiter(value.to_string()));
    }
    Ok(())
}

/// Key of one uploaded part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartKey {
    pub bucket_uid: String,
    pub object_key: String,
    pub upload_id: String,
    pub part_number: u32,
    pub md5: String,
    pub location: Location,
}

impl PartKey {
    pub fn new(
        bucket_uid: impl Into<String>,
        object_key: impl Into<String>,
        upload_id: impl Into<String>,
        part_number: u32,
        md5: impl Into<String>,
        location: Location,
    ) -> Result<Self, GatewayError> {
        let key = Self {
            bucket_uid: bucket_uid.into(),
            object_key: object_key.into(),
            upload_id: upload_id.into(),
            part_number,
            md5: md5.into(),
            location,
        };
        for component in [
            key.bucket_uid.as_str(),
            key.object_key.as_str(),
            key.upload_id.as_str(),
            key.md5.as_str(),
            key.location.as_str(),
        ] {
            check_component(component)?;
        }
        Ok(key)
    }

    /// Prefix shared by every part of one upload
    pub fn upload_prefix(bucket_uid: &str, object_key: &str, upload_id: &str) -> String {
        [bucket_uid, object_key, upload_id, ""].join(DELIMITER)
    }

    /// Prefix shared by every stored version of one part number
    pub fn part_prefix(
        bucket_uid: &str,
        object_key: &str,
        upload_id: &str,
        part_number: u32,
    ) -> String {
        let part_number = part_number.to_string();
        [bucket_uid, object_key, upload_id, part_number.as_str(), ""].join(DELIMITER)
    }

    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let fields: Vec<&str> = raw.split(DELIMITER).collect();
        if fields.len() != PART_FIELDS {
            return Err(GatewayError::MalformedKey(raw.to_string()));
        }
        let part_number = fields[3]
            .parse()
            .map_err(|_| GatewayError::MalformedKey(raw.to_string()))?;

        Ok(Self {
            bucket_uid: fields[0].to_string(),
            object_key: fields[1].to_string(),
            upload_id: fields[2].to_string(),
            part_number,
            md5: fields[4].to_string(),
            location: Location::new(fields[LOCATION_FIELD]),
        })
    }
}

impl fmt::Display for PartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{d}{}{d}{}{d}{}{d}{}{d}{}",
            self.bucket_uid,
            self.object_key,
            self.upload_id,
            self.part_number,
            self.md5,
            self.location,
            d = DELIMITER
        )
    }
}

/// Key of the record that marks an upload as open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewKey {
    pub object_key: String,
    pub upload_id: String,
    pub initiator: String,
    /// RFC 3339 initiation time
    pub initiated: String,
}

impl OverviewKey {
    pub fn new(
        object_key: impl Into<String>,
        upload_id: impl Into<String>,
        initiator: impl Into<String>,
        initiated: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let key = Self {
            object_key: object_key.into(),
            upload_id: upload_id.into(),
            initiator: initiator.into(),
            initiated: initiated.into(),
        };
        for component in [
            key.object_key.as_str(),
            key.upload_id.as_str(),
            key.initiator.as_str(),
            key.initiated.as_str(),
        ] {
            check_component(component)?;
        }
        Ok(key)
    }

    /// Prefix that locates the overview of one upload
    pub fn upload_prefix(object_key: &str, upload_id: &str) -> String {
        [OVERVIEW_TAG, object_key, upload_id, ""].join(DELIMITER)
    }

    /// The ordered token sequence; joined with [`DELIMITER`] it is the stored key
    pub fn tokens(&self) -> Vec<String> {
        vec![
            OVERVIEW_TAG.to_string(),
            self.object_key.clone(),
            self.upload_id.clone(),
            self.initiator.clone(),
            self.initiated.clone(),
        ]
    }

    pub fn from_tokens(tokens: &[&str]) -> Option<Self> {
        match tokens {
            [tag, object_key, upload_id, initiator, initiated] if *tag == OVERVIEW_TAG => {
                Some(Self {
                    object_key: (*object_key).to_string(),
                    upload_id: (*upload_id).to_string(),
                    initiator: (*initiator).to_string(),
                    initiated: (*initiated).to_string(),
                })
            }
            _ => None,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let tokens: Vec<&str> = raw.split(DELIMITER).collect();
        if tokens.len() != OVERVIEW_FIELDS {
            return Err(GatewayError::MalformedKey(raw.to_string()));
        }
        Self::from_tokens(&tokens).ok_or_else(|| GatewayError::MalformedKey(raw.to_string()))
    }
}

impl fmt::Display for OverviewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens().join(DELIMITER))
    }
}
