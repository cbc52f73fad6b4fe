//! In-memory store, used when no store path is configured and in tests.

use std::sync::RwLock;

use async_trait::async_trait;
use cachet_core::{CachetResult, RequestFingerprint, StorageError, TimestampMs};

use crate::store::{PersistentStore, RecordFilter, StoredRecord};

/// A `responses` table held in a vector.
///
/// Rows keep insertion order and duplicates are allowed, the same as a plain
/// SQL table without a unique constraint. Use [`PersistentStore::replace`] to
/// keep one row per fingerprint.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: RwLock<Vec<StoredRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the table, e.g. with rows written before schema 0.2.
    pub fn with_records(records: Vec<StoredRecord>) -> Self {
        Self {
            rows: RwLock::new(records),
        }
    }

    /// Copy of every row, in insertion order.
    pub fn snapshot(&self) -> CachetResult<Vec<StoredRecord>> {
        let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(rows.clone())
    }
}

#[async_trait]
impl PersistentStore for InMemoryStore {
    async fn find(&self, fingerprint: &RequestFingerprint) -> CachetResult<Vec<StoredRecord>> {
        let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(rows
            .iter()
            .filter(|row| row.fingerprint == *fingerprint)
            .cloned()
            .collect())
    }

    async fn insert(&self, record: StoredRecord) -> CachetResult<()> {
        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        rows.push(record);
        Ok(())
    }

    async fn destroy(&self, filter: &RecordFilter) -> CachetResult<u64> {
        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = rows.len();
        rows.retain(|row| !filter.matches(row));
        Ok((before - rows.len()) as u64)
    }

    async fn recent_last_used(&self, limit: usize) -> CachetResult<Vec<TimestampMs>> {
        let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut stamps: Vec<TimestampMs> = rows.iter().filter_map(|row| row.last_used).collect();
        stamps.sort_unstable_by(|a, b| b.cmp(a));
        stamps.truncate(limit);
        Ok(stamps)
    }

    async fn count(&self) -> CachetResult<u64> {
        let rows = self.rows.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(rows.len() as u64)
    }

    async fn reset(&self) -> CachetResult<()> {
        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        rows.clear();
        Ok(())
    }

    async fn replace(&self, record: StoredRecord) -> CachetResult<()> {
        // Single lock acquisition so concurrent writers never see the gap.
        let mut rows = self.rows.write().map_err(|_| StorageError::LockPoisoned)?;
        rows.retain(|row| row.fingerprint != record.fingerprint);
        rows.push(record);
        Ok(())
    }
}
