//! Persistent store contract.
//!
//! The response cache sees its backing store as a single logical `responses`
//! table keyed by the fingerprint columns. Every operation is asynchronous;
//! the cache never blocks its caller on one.

use async_trait::async_trait;
use cachet_core::{CachetResult, RequestFingerprint, TimestampMs};
use serde::{Deserialize, Serialize};

/// A row of the `responses` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Lookup key columns.
    pub fingerprint: RequestFingerprint,
    /// Encoded result payload, see [`crate::CacheEntryCodec`].
    pub payload: String,
    /// Write time. Missing on records written before schema 0.2.
    #[serde(default)]
    pub last_used: Option<TimestampMs>,
}

impl StoredRecord {
    pub fn new(fingerprint: RequestFingerprint, payload: String, last_used: TimestampMs) -> Self {
        Self {
            fingerprint,
            payload,
            last_used: Some(last_used),
        }
    }
}

/// Which rows a destroy applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    /// Every row whose key columns equal the fingerprint.
    Fingerprint(RequestFingerprint),
    /// `lastUsed < older_than OR lastUsed IS NULL`. With no threshold only
    /// untimestamped rows match.
    StaleOrUntimestamped { older_than: Option<TimestampMs> },
}

impl RecordFilter {
    /// Returns true if `record` is selected by this filter.
    pub fn matches(&self, record: &StoredRecord) -> bool {
        match self {
            RecordFilter::Fingerprint(fingerprint) => record.fingerprint == *fingerprint,
            RecordFilter::StaleOrUntimestamped { older_than } => match record.last_used {
                None => true,
                Some(last_used) => older_than.is_some_and(|threshold| last_used < threshold),
            },
        }
    }
}

/// Backing store for cached responses.
///
/// Implementations must make a `find` observe every write committed before it
/// was issued. Individual operations are atomic; nothing else is guaranteed
/// across calls.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Rows whose key columns equal `fingerprint`.
    async fn find(&self, fingerprint: &RequestFingerprint) -> CachetResult<Vec<StoredRecord>>;

    /// Add a row.
    async fn insert(&self, record: StoredRecord) -> CachetResult<()>;

    /// Remove every row matched by `filter`, returning how many went.
    async fn destroy(&self, filter: &RecordFilter) -> CachetResult<u64>;

    /// Up to `limit` timestamps, most recent first. Untimestamped rows are
    /// not reported.
    async fn recent_last_used(&self, limit: usize) -> CachetResult<Vec<TimestampMs>>;

    /// Number of rows in the table.
    async fn count(&self) -> CachetResult<u64>;

    /// Drop every row.
    async fn reset(&self) -> CachetResult<()>;

    /// Delete any row at the record's fingerprint, then insert the record.
    ///
    /// Stores with multi-operation transactions should override this so the
    /// pair commits together.
    async fn replace(&self, record: StoredRecord) -> CachetResult<()> {
        self.destroy(&RecordFilter::Fingerprint(record.fingerprint.clone()))
            .await?;
        self.insert(record).await
    }
}
