//! Cachet Storage - Persistent Response Cache
//!
//! Holds completed response outcomes keyed by request fingerprint, either in
//! memory or in an LMDB environment, and keeps the table bounded to the most
//! recently written entries.

pub mod clock;
pub mod codec;
pub mod eviction;
pub mod lmdb_backend;
pub mod memory;
pub mod response_cache;
pub mod store;

use std::sync::Arc;

use cachet_core::{CachetConfig, CachetResult};
use tracing::info;

pub use clock::MonotonicClock;
pub use codec::CacheEntryCodec;
pub use eviction::EvictionPolicy;
pub use lmdb_backend::{LmdbStore, LmdbStoreError, CURRENT_SCHEMA_VERSION, SCHEMA_VERSIONS};
pub use memory::InMemoryStore;
pub use response_cache::{CacheStats, ResponseCache};
pub use store::{PersistentStore, RecordFilter, StoredRecord};

/// Open the store `config` describes: LMDB when a store path is set,
/// otherwise an in-memory table.
pub fn open_store(config: &CachetConfig) -> CachetResult<Arc<dyn PersistentStore>> {
    match &config.store_path {
        Some(path) => {
            let store = LmdbStore::open(path, config.map_size_mb)?;
            Ok(Arc::new(store))
        }
        None => {
            info!("No store path configured, caching responses in memory");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}
