//! Request fingerprints
//!
//! A fingerprint is the exact-match cache key of a request. Two requests with
//! equal fingerprints are cache-equivalent. There is no normalization beyond
//! the canonical serialization of each field.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{BodyFormat, HeaderSet, RequestDescriptor};

/// Serialized form of an empty header set.
pub const EMPTY_HEADERS: &str = "{}";

/// The defining fields of a request, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestFingerprint {
    pub is_structured: bool,
    pub is_document: bool,
    /// Canonical JSON object of the header set.
    pub headers: String,
    pub address: String,
    pub method: String,
    /// Wire body, empty when the request has none.
    pub body: String,
}

impl RequestFingerprint {
    /// Body format the fingerprinted request declared.
    pub fn body_format(&self) -> BodyFormat {
        BodyFormat {
            is_json: self.is_structured,
            is_xml: self.is_document,
        }
    }

    /// SHA-256 over a length-prefixed encoding of every field.
    ///
    /// Suitable as a fixed-size storage key. Collisions are still resolved by
    /// comparing full fingerprints.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update([self.is_structured as u8, self.is_document as u8]);
        for field in [&self.headers, &self.address, &self.method, &self.body] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        let result = hasher.finalize();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&result);
        digest
    }

    /// Hex form of [`digest`](Self::digest), for logging.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest())
    }
}

/// Derives [`RequestFingerprint`]s from request descriptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintBuilder;

impl FingerprintBuilder {
    /// Compute the fingerprint of `request`.
    ///
    /// Pure and infallible: an absent body maps to the empty string and an
    /// empty header set to [`EMPTY_HEADERS`].
    pub fn build(request: &RequestDescriptor) -> RequestFingerprint {
        RequestFingerprint {
            is_structured: request.format.is_json,
            is_document: request.format.is_xml,
            headers: serialize_headers(&request.headers),
            address: request.address.clone(),
            method: request.method.as_str().to_string(),
            body: request.body_string().unwrap_or_default(),
        }
    }
}

impl RequestDescriptor {
    /// Shorthand for [`FingerprintBuilder::build`].
    pub fn fingerprint(&self) -> RequestFingerprint {
        FingerprintBuilder::build(self)
    }
}

fn serialize_headers(headers: &HeaderSet) -> String {
    if headers.is_empty() {
        return EMPTY_HEADERS.to_string();
    }
    let object: serde_json::Map<String, serde_json::Value> = headers
        .iter()
        .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
        .collect();
    serde_json::Value::Object(object).to_string()
}
