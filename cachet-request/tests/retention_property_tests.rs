//! Property-Based Tests for Store Retention
//!
//! **Property: Bounded Retention**
//!
//! For any sequence of distinct cacheable requests and any retention limit,
//! after every request has settled:
//! - The store holds `min(requests, limit)` entries
//! - Each surviving entry belongs to one of the most recent `limit` requests
//! - Each request owns at most one entry

use std::collections::HashSet;
use std::sync::Arc;

use cachet_core::RequestDescriptor;
use cachet_request::{CacheableRequest, CachetConfig, RequestManager};
use cachet_storage::PersistentStore;
use cachet_test_utils::{fixtures, generators, MockTransport};
use proptest::prelude::*;
use tokio::runtime::Runtime;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

// ============================================================================
// PROPERTY TEST STRATEGIES
// ============================================================================

/// Requests with pairwise distinct fingerprints, in send order.
fn request_sequence_strategy() -> impl Strategy<Value = Vec<RequestDescriptor>> {
    proptest::collection::vec(generators::arb_request_descriptor(), 1..16).prop_map(
        |descriptors| {
            let mut seen = HashSet::new();
            descriptors
                .into_iter()
                .filter(|d| seen.insert(d.fingerprint().digest()))
                .collect()
        },
    )
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_store_keeps_most_recent_entries(
        requests in request_sequence_strategy(),
        limit in 1usize..8,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let config = CachetConfig::new().with_max_entries(limit);
            let transport = Arc::new(MockTransport::new());
            let (cache, store) = fixtures::memory_cache(&config);
            let manager = Arc::new(RequestManager::new(transport.clone(), cache, config));

            for descriptor in &requests {
                transport.queue_response(fixtures::ok_text(&descriptor.address));
                let mut request = CacheableRequest::new(Arc::clone(&manager), descriptor.clone());
                let sent = request
                    .send(None)
                    .await
                    .map_err(|e| TestCaseError::fail(format!("send failed: {}", e)))?;
                if let Some(proxy) = sent.into_proxy() {
                    proxy.settled().await;
                }
            }

            let count = store
                .count()
                .await
                .map_err(|e| TestCaseError::fail(format!("count failed: {}", e)))?;
            prop_assert_eq!(count as usize, requests.len().min(limit));

            let cutoff = requests.len().saturating_sub(limit);
            for (i, descriptor) in requests.iter().enumerate() {
                let rows = store
                    .find(&descriptor.fingerprint())
                    .await
                    .map_err(|e| TestCaseError::fail(format!("find failed: {}", e)))?;
                let expected = if i >= cutoff { 1 } else { 0 };
                prop_assert_eq!(rows.len(), expected, "{} at position {}", descriptor.address, i);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
