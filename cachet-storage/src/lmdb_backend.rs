//! LMDB-backed response store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep the `responses` table
//! in a memory-mapped file, so cached responses survive process restarts.
//!
//! # Layout
//!
//! Two named databases live in one environment:
//! - `responses`: key is the 32-byte fingerprint digest, value is the JSON
//!   encoded [`StoredRecord`]. The full fingerprint inside the value is
//!   compared on lookup, so digest collisions can never serve the wrong row.
//! - `meta`: holds the schema version under [`VERSION_KEY`].
//!
//! # Schema versions
//!
//! - `0.1`: fingerprint columns plus payload.
//! - `0.2`: adds the write timestamp. Rows from 0.1 read back without one and
//!   are removed by the next eviction sweep.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Reads use read transactions; every
//! mutating operation (including the destroy-then-insert of a replace) runs in
//! a single write transaction.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cachet_core::{CachetError, CachetResult, RequestFingerprint, StorageError, TimestampMs};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use tracing::{debug, info, warn};

use crate::store::{PersistentStore, RecordFilter, StoredRecord};

/// Schema versions in the order they are applied.
pub const SCHEMA_VERSIONS: [&str; 2] = ["0.1", "0.2"];

/// Version a freshly opened store ends up at.
pub const CURRENT_SCHEMA_VERSION: &str = "0.2";

/// Key of the schema version in the `meta` database.
pub const VERSION_KEY: &str = "schema_version";

const RESPONSES_DB: &str = "responses";
const META_DB: &str = "meta";

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment at {path}: {reason}")]
    EnvOpen { path: String, reason: String },

    /// Failed to open a database within the environment.
    #[error("Failed to open database {name}: {reason}")]
    DbOpen { name: String, reason: String },

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The stored schema cannot be brought to the current version.
    #[error("Cannot migrate schema from {from}: {reason}")]
    Schema { from: String, reason: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<heed::Error> for LmdbStoreError {
    fn from(e: heed::Error) -> Self {
        LmdbStoreError::Transaction(e.to_string())
    }
}

/// Convert LmdbStoreError to CachetError.
impl From<LmdbStoreError> for CachetError {
    fn from(e: LmdbStoreError) -> Self {
        let storage = match e {
            LmdbStoreError::EnvOpen { path, reason } => StorageError::OpenFailed { path, reason },
            LmdbStoreError::Io(io) => StorageError::OpenFailed {
                path: String::new(),
                reason: io.to_string(),
            },
            LmdbStoreError::Schema { from, reason } => StorageError::SchemaMigration {
                from,
                to: CURRENT_SCHEMA_VERSION.to_string(),
                reason,
            },
            LmdbStoreError::Serialization(reason) => StorageError::Serialization { reason },
            other @ (LmdbStoreError::DbOpen { .. } | LmdbStoreError::Transaction(_)) => {
                StorageError::TransactionFailed {
                    reason: other.to_string(),
                }
            }
        };
        CachetError::Storage(storage)
    }
}

/// LMDB-backed [`PersistentStore`].
///
/// Unlike [`crate::InMemoryStore`], a fingerprint maps to at most one row: an
/// insert at an existing fingerprint overwrites it.
///
/// # Example
///
/// ```ignore
/// use cachet_storage::{LmdbStore, PersistentStore};
///
/// let store = LmdbStore::open("/var/cache/cachet", 64)?;
/// let rows = store.find(&request.fingerprint()).await?;
/// ```
pub struct LmdbStore {
    env: Env,
    responses: Database<Bytes, Bytes>,
    meta: Database<Str, Str>,
    path: PathBuf,
}

impl LmdbStore {
    /// Open (or create) a store in `path` and migrate it to the current schema.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - The stored schema version is unknown
    pub fn open<P: AsRef<Path>>(path: P, map_size_mb: usize) -> Result<Self, LmdbStoreError> {
        let path = path.as_ref().to_path_buf();
        let map_size = map_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| LmdbStoreError::EnvOpen {
                path: path.display().to_string(),
                reason: format!("map size of {map_size_mb} MB overflows"),
            })?;
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(2)
                .open(&path)
        }
        .map_err(|e| LmdbStoreError::EnvOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut wtxn = env.write_txn()?;
        let responses: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(RESPONSES_DB))
            .map_err(|e| LmdbStoreError::DbOpen {
                name: RESPONSES_DB.to_string(),
                reason: e.to_string(),
            })?;
        let meta: Database<Str, Str> = env
            .create_database(&mut wtxn, Some(META_DB))
            .map_err(|e| LmdbStoreError::DbOpen {
                name: META_DB.to_string(),
                reason: e.to_string(),
            })?;

        let store = Self {
            env: env.clone(),
            responses,
            meta,
            path,
        };
        store.migrate(&mut wtxn)?;
        wtxn.commit()?;

        info!(path = %store.path.display(), version = CURRENT_SCHEMA_VERSION, "Opened LMDB response store");
        Ok(store)
    }

    /// Directory the environment lives in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema version recorded in the store.
    pub fn schema_version(&self) -> Result<Option<String>, LmdbStoreError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.meta.get(&rtxn, VERSION_KEY)?.map(str::to_owned))
    }

    /// Apply every schema step after the recorded version.
    fn migrate(&self, wtxn: &mut RwTxn<'_>) -> Result<(), LmdbStoreError> {
        let recorded = self.meta.get(wtxn, VERSION_KEY)?.map(str::to_owned);
        let start = match recorded.as_deref() {
            None => 0,
            Some(version) => SCHEMA_VERSIONS
                .iter()
                .position(|known| *known == version)
                .map(|index| index + 1)
                .ok_or_else(|| LmdbStoreError::Schema {
                    from: version.to_string(),
                    reason: "unknown schema version".to_string(),
                })?,
        };

        for version in &SCHEMA_VERSIONS[start..] {
            if *version == "0.2" {
                let legacy = self.untimestamped_rows(wtxn)?;
                debug!(legacy, "Rows without a write timestamp await the next sweep");
            }
            self.meta.put(wtxn, VERSION_KEY, version)?;
            debug!(
                from = recorded.as_deref().unwrap_or("none"),
                to = *version,
                "Applied schema step"
            );
        }
        Ok(())
    }

    fn untimestamped_rows(&self, txn: &heed::RoTxn<'_>) -> Result<u64, LmdbStoreError> {
        let mut legacy = 0;
        for entry in self.responses.iter(txn)? {
            let Ok((_, bytes)) = entry else { continue };
            match decode_row(bytes) {
                Ok(record) if record.last_used.is_some() => {}
                _ => legacy += 1,
            }
        }
        Ok(legacy)
    }

    /// Keys of every row the filter selects. Rows that no longer decode are
    /// treated as untimestamped.
    fn matching_keys(
        &self,
        txn: &heed::RoTxn<'_>,
        filter: &RecordFilter,
    ) -> Result<Vec<Vec<u8>>, LmdbStoreError> {
        if let RecordFilter::Fingerprint(fingerprint) = filter {
            let key = fingerprint.digest();
            return Ok(match self.responses.get(txn, &key)? {
                Some(bytes) if decode_row(bytes).is_ok_and(|r| r.fingerprint == *fingerprint) => {
                    vec![key.to_vec()]
                }
                _ => Vec::new(),
            });
        }

        let mut keys = Vec::new();
        for entry in self.responses.iter(txn)? {
            let (key, bytes) = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let selected = match decode_row(bytes) {
                Ok(record) => filter.matches(&record),
                Err(e) => {
                    warn!(error = %e, "Undecodable row selected for removal");
                    true
                }
            };
            if selected {
                keys.push(key.to_vec());
            }
        }
        Ok(keys)
    }
}

fn decode_row(bytes: &[u8]) -> Result<StoredRecord, LmdbStoreError> {
    serde_json::from_slice(bytes).map_err(|e| LmdbStoreError::Serialization(e.to_string()))
}

fn encode_row(record: &StoredRecord) -> Result<Vec<u8>, LmdbStoreError> {
    serde_json::to_vec(record).map_err(|e| LmdbStoreError::Serialization(e.to_string()))
}

#[async_trait]
impl PersistentStore for LmdbStore {
    async fn find(&self, fingerprint: &RequestFingerprint) -> CachetResult<Vec<StoredRecord>> {
        let rtxn = self.env.read_txn().map_err(LmdbStoreError::from)?;
        let Some(bytes) = self
            .responses
            .get(&rtxn, &fingerprint.digest())
            .map_err(LmdbStoreError::from)?
        else {
            return Ok(Vec::new());
        };

        let record = decode_row(bytes)?;
        if record.fingerprint != *fingerprint {
            warn!(digest = %fingerprint.digest_hex(), "Fingerprint digest collision");
            return Ok(Vec::new());
        }
        Ok(vec![record])
    }

    async fn insert(&self, record: StoredRecord) -> CachetResult<()> {
        let bytes = encode_row(&record)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbStoreError::from)?;
        self.responses
            .put(&mut wtxn, &record.fingerprint.digest(), &bytes)
            .map_err(LmdbStoreError::from)?;
        wtxn.commit().map_err(LmdbStoreError::from)?;
        Ok(())
    }

    async fn destroy(&self, filter: &RecordFilter) -> CachetResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(LmdbStoreError::from)?;
        let keys = self.matching_keys(&wtxn, filter)?;

        let mut deleted = 0u64;
        for key in &keys {
            if self
                .responses
                .delete(&mut wtxn, key)
                .map_err(LmdbStoreError::from)?
            {
                deleted += 1;
            }
        }

        wtxn.commit().map_err(LmdbStoreError::from)?;
        Ok(deleted)
    }

    async fn recent_last_used(&self, limit: usize) -> CachetResult<Vec<TimestampMs>> {
        let rtxn = self.env.read_txn().map_err(LmdbStoreError::from)?;
        let mut stamps = Vec::new();
        for entry in self.responses.iter(&rtxn).map_err(LmdbStoreError::from)? {
            let Ok((_, bytes)) = entry else { continue };
            if let Ok(StoredRecord {
                last_used: Some(last_used),
                ..
            }) = decode_row(bytes)
            {
                stamps.push(last_used);
            }
        }
        stamps.sort_unstable_by(|a, b| b.cmp(a));
        stamps.truncate(limit);
        Ok(stamps)
    }

    async fn count(&self) -> CachetResult<u64> {
        let rtxn = self.env.read_txn().map_err(LmdbStoreError::from)?;
        Ok(self.responses.len(&rtxn).map_err(LmdbStoreError::from)?)
    }

    async fn reset(&self) -> CachetResult<()> {
        let mut wtxn = self.env.write_txn().map_err(LmdbStoreError::from)?;
        self.responses
            .clear(&mut wtxn)
            .map_err(LmdbStoreError::from)?;
        wtxn.commit().map_err(LmdbStoreError::from)?;
        Ok(())
    }

    async fn replace(&self, record: StoredRecord) -> CachetResult<()> {
        let key = record.fingerprint.digest();
        let bytes = encode_row(&record)?;

        let mut wtxn = self.env.write_txn().map_err(LmdbStoreError::from)?;
        self.responses
            .delete(&mut wtxn, &key)
            .map_err(LmdbStoreError::from)?;
        self.responses
            .put(&mut wtxn, &key, &bytes)
            .map_err(LmdbStoreError::from)?;
        wtxn.commit().map_err(LmdbStoreError::from)?;
        Ok(())
    }
}
