//! Request ID generation

use base64::Engine;
use std::fmt;
use uuid::Uuid;

/// Identifier attached to every coordinator call and its log span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId {
    /// Primary request ID (x-amz-request-id)
    pub id: String,
    /// Extended request ID (x-amz-id-2), base64 encoded
    pub extended_id: String,
}

impl RequestId {
    /// Generate a new request ID pair
    pub fn new() -> Self {
        let id = Uuid::new_v4().simple().to_string().to_uppercase();
        let extended_id = encode(Uuid::new_v4().as_bytes());
        Self { id, extended_id }
    }

    /// Create a request ID with a specific value (for testing)
    pub fn with_id(id: impl Into<String>) -> Self {
        let id = id.into();
        let extended_id = encode(id.as_bytes());
        Self { id, extended_id }
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

fn encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}
