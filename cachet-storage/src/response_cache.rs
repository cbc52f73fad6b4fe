//! Lookup and write-back of cached responses.
//!
//! The response cache sits between the reconciliation engine and a
//! [`PersistentStore`]. Neither direction ever fails from the caller's point
//! of view: a store or codec failure on lookup is a miss, and a failure on
//! write-back is logged and dropped.

use std::sync::{Arc, RwLock};

use cachet_core::{
    CachetConfig, CachetError, CachetResult, RequestFingerprint, ResponseOutcome,
};
use tracing::{debug, warn};

use crate::clock::MonotonicClock;
use crate::codec::CacheEntryCodec;
use crate::eviction::EvictionPolicy;
use crate::store::{PersistentStore, StoredRecord};

/// Counters for cache activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that ran to completion, whatever they found.
    pub lookups: u64,
    /// Stored outcomes that were actually shown to a caller.
    pub hits: u64,
    /// Lookups with no row.
    pub misses: u64,
    /// Lookups whose row or store access failed.
    pub failed_lookups: u64,
    /// Successful write-backs.
    pub writes: u64,
    /// Write-backs that did not reach the store.
    pub failed_writes: u64,
    /// Rows removed by eviction sweeps.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate over all completed lookups.
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

/// Fingerprint-keyed response cache over a persistent store.
pub struct ResponseCache {
    store: Arc<dyn PersistentStore>,
    codec: CacheEntryCodec,
    eviction: EvictionPolicy,
    clock: MonotonicClock,
    stats: RwLock<CacheStats>,
}

impl ResponseCache {
    /// Create a cache that keeps `config.max_entries` entries in `store`.
    pub fn new(store: Arc<dyn PersistentStore>, config: &CachetConfig) -> Self {
        Self::with_eviction(store, EvictionPolicy::new(config.max_entries))
    }

    pub fn with_eviction(store: Arc<dyn PersistentStore>, eviction: EvictionPolicy) -> Self {
        Self {
            store,
            codec: CacheEntryCodec::new(),
            eviction,
            clock: MonotonicClock::new(),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Get a reference to the backing store.
    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    pub fn eviction(&self) -> EvictionPolicy {
        self.eviction
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    /// The stored outcome for `fingerprint`, if a usable one exists.
    ///
    /// The first row found wins. The body is parsed with the format the
    /// fingerprint declares. A found outcome only counts as a hit once the
    /// caller reports it shown with [`record_hit`](Self::record_hit); a result
    /// that arrives too late to be used is counted as a lookup and nothing
    /// more.
    pub async fn lookup(&self, fingerprint: &RequestFingerprint) -> Option<ResponseOutcome> {
        let result = self.try_lookup(fingerprint).await;
        self.record(|s| s.lookups += 1);
        match result {
            Ok(Some(outcome)) => {
                debug!(digest = %fingerprint.digest_hex(), status = %outcome.status, "Cache row found");
                Some(outcome)
            }
            Ok(None) => {
                self.record(|s| s.misses += 1);
                debug!(digest = %fingerprint.digest_hex(), "Cache miss");
                None
            }
            Err(e) => {
                self.record(|s| s.failed_lookups += 1);
                warn!(
                    digest = %fingerprint.digest_hex(),
                    address = %fingerprint.address,
                    error = %e,
                    "Cached response unusable, treating as miss"
                );
                None
            }
        }
    }

    /// Count a looked-up outcome that was shown to a caller.
    pub fn record_hit(&self) {
        self.record(|s| s.hits += 1);
    }

    async fn try_lookup(
        &self,
        fingerprint: &RequestFingerprint,
    ) -> CachetResult<Option<ResponseOutcome>> {
        let rows = self.store.find(fingerprint).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let outcome = self
            .codec
            .decode(&row.payload, fingerprint.body_format())
            .map_err(CachetError::from)?;
        Ok(Some(outcome))
    }

    /// Persist `outcome` as the single entry for `fingerprint`, then sweep.
    ///
    /// The error is returned for inspection only; it has already been logged
    /// and callers are free to drop it. A failed sweep does not fail the
    /// write-back.
    pub async fn write_back(
        &self,
        fingerprint: &RequestFingerprint,
        outcome: &ResponseOutcome,
    ) -> CachetResult<()> {
        if let Err(e) = self.try_write(fingerprint, outcome).await {
            self.record(|s| s.failed_writes += 1);
            warn!(
                digest = %fingerprint.digest_hex(),
                address = %fingerprint.address,
                error = %e,
                "Failed to write response to cache"
            );
            return Err(e);
        }
        self.record(|s| s.writes += 1);

        match self.eviction.sweep(self.store.as_ref()).await {
            Ok(removed) => self.record(|s| s.evictions += removed),
            Err(e) => warn!(error = %e, "Eviction sweep failed"),
        }
        Ok(())
    }

    async fn try_write(
        &self,
        fingerprint: &RequestFingerprint,
        outcome: &ResponseOutcome,
    ) -> CachetResult<()> {
        let payload = self.codec.encode(outcome)?;
        let record = StoredRecord::new(fingerprint.clone(), payload, self.clock.now_ms());
        self.store.replace(record).await
    }
}
