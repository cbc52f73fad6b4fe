//! Cachet Core - Request and Response Types
//!
//! Pure data structures and pure functions shared by every cachet crate:
//! request descriptors, response outcomes, fingerprints, errors and
//! configuration, plus the contract an outbound transport implements. No I/O
//! happens here.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod request;
pub mod response;
pub mod transport;

pub use config::{CachetConfig, DEFAULT_MAP_SIZE_MB, DEFAULT_MAX_ENTRIES};
pub use error::{
    CachetError, CachetResult, CodecError, ConfigError, StorageError, TransportError,
};
pub use fingerprint::{FingerprintBuilder, RequestFingerprint, EMPTY_HEADERS};
pub use request::{
    BodyFormat, HeaderSet, Method, PreparedRequest, RequestBody, RequestDescriptor,
};
pub use response::{ErrorDetail, ResponseBody, ResponseOutcome, StatusCode};
pub use transport::{LiveResponse, NetworkTransport};

/// Milliseconds since the Unix epoch.
pub type TimestampMs = i64;
