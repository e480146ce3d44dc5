//! Payload digests and Content-MD5 verification

use crate::error::GatewayError;
use base64::Engine;
use http::HeaderMap;
use md5::{Digest, Md5};

pub const CONTENT_MD5_HEADER: &str = "content-md5";

/// Hex-encoded MD5 of `data`
pub fn compute_md5(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compare a declared `Content-MD5` header with the computed digest.
///
/// The header is normally base64 of the 16 raw digest bytes; a 32 character
/// hex digest is accepted as well. A missing header always passes.
pub fn verify_content_md5(headers: &HeaderMap, computed_hex: &str) -> Result<(), GatewayError> {
    let Some(declared) = headers.get(CONTENT_MD5_HEADER) else {
        return Ok(());
    };
    let declared = declared.to_str().unwrap_or_default().trim();

    if declared_hex(declared).as_deref() == Some(computed_hex) {
        return Ok(());
    }

    Err(GatewayError::ContentMd5Invalid {
        declared: declared.to_string(),
        computed: computed_hex.to_string(),
    })
}

fn declared_hex(declared: &str) -> Option<String> {
    if declared.len() == 32 && declared.chars().all(|c| c.is_ascii_hexdigit()) {
        return Some(declared.to_ascii_lowercase());
    }

    let raw = base64::engine::general_purpose::STANDARD
        .decode(declared)
        .ok()?;
    (raw.len() == 16).then(|| hex::encode(raw))
}
