//! Error types for cachet operations

use thiserror::Error;

/// Persistent store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to open store at {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Schema migration from {from} to {to} failed: {reason}")]
    SchemaMigration {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Record serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache payload encoding/decoding errors.
///
/// These never reach a caller of the request surface: a payload that fails to
/// decode is treated as if no cache entry existed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed cache payload: {reason}")]
    MalformedPayload { reason: String },

    #[error("Stored body is not valid JSON: {reason}")]
    InvalidJsonBody { reason: String },

    #[error("Stored body is not a valid document: {reason}")]
    InvalidDocumentBody { reason: String },
}

/// Configuration errors.
///
/// Raised synchronously at send time (or when loading configuration), never
/// delivered through a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Timeout values cannot be used with synchronous requests")]
    TimeoutOnSynchronous,

    #[error("The timeout value must either not be specified or must be greater than 0")]
    ZeroTimeout,

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors relayed from the outbound transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request to {address} was not prepared for sending")]
    NotPrepared { address: String },

    #[error("Request to {address} has already been fired")]
    AlreadyFired { address: String },

    #[error("Transport rejected request to {address}: {reason}")]
    Rejected { address: String, reason: String },
}

/// Master error type for all cachet errors.
#[derive(Debug, Clone, Error)]
pub enum CachetError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type alias for cachet operations.
pub type CachetResult<T> = Result<T, CachetError>;

// =============================================================================
// TESTS
// =============================================================================
