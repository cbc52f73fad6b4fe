//! Bounded retention for the `responses` table.

use cachet_core::{CachetResult, DEFAULT_MAX_ENTRIES};
use tracing::debug;

use crate::store::{PersistentStore, RecordFilter};

/// Keeps the most recently written entries and drops the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    max_entries: usize,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl EvictionPolicy {
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Remove every row older than the `max_entries`-th most recent write,
    /// plus every row without a timestamp. Returns the number removed.
    ///
    /// With fewer timestamped rows than the limit only untimestamped rows go.
    pub async fn sweep(&self, store: &dyn PersistentStore) -> CachetResult<u64> {
        let recent = store.recent_last_used(self.max_entries).await?;
        let older_than = recent.last().copied();
        let removed = store
            .destroy(&RecordFilter::StaleOrUntimestamped { older_than })
            .await?;
        if removed > 0 {
            debug!(removed, ?older_than, "Evicted cached responses");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::store::StoredRecord;
    use cachet_core::{Method, RequestDescriptor, TimestampMs};

    fn record(index: usize, last_used: Option<TimestampMs>) -> StoredRecord {
        StoredRecord {
            fingerprint: RequestDescriptor::new(Method::Get, format!("/{index}")).fingerprint(),
            payload: "{}".to_string(),
            last_used,
        }
    }

    #[tokio::test]
    async fn test_keeps_most_recent() {
        let rows = (0..15).map(|i| record(i, Some(i as TimestampMs * 10))).collect();
        let store = InMemoryStore::with_records(rows);

        let removed = EvictionPolicy::new(10)
            .sweep(&store)
            .await
            .expect("sweep should succeed");
        assert_eq!(removed, 5);

        let mut kept: Vec<_> = store
            .snapshot()
            .expect("snapshot")
            .into_iter()
            .filter_map(|r| r.last_used)
            .collect();
        kept.sort_unstable();
        assert_eq!(kept, (5..15).map(|i| i * 10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_under_limit_removes_only_untimestamped() {
        let store = InMemoryStore::with_records(vec![
            record(0, Some(1)),
            record(1, None),
            record(2, Some(2)),
        ]);

        let removed = EvictionPolicy::new(10).sweep(&store).await.expect("sweep");
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.expect("count"), 2);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = InMemoryStore::new();
        let removed = EvictionPolicy::default().sweep(&store).await.expect("sweep");
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_ties_at_threshold_are_kept() {
        // Equal timestamps at the cut all survive, so the table can exceed
        // the limit when writes share a timestamp.
        let store = InMemoryStore::with_records(vec![
            record(0, Some(5)),
            record(1, Some(5)),
            record(2, Some(5)),
            record(3, Some(1)),
        ]);

        let removed = EvictionPolicy::new(2).sweep(&store).await.expect("sweep");
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.expect("count"), 3);
    }
}
