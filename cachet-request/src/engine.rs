//! Reconciliation engine
//!
//! For every cacheable request the engine spawns one task that races the
//! store lookup against the live response and drives a [`Reconciler`] with
//! whichever lands. Snapshots go out on a watch channel; the write-back runs
//! after the final snapshot has been published, so callers never wait on it.

use std::sync::Arc;

use cachet_core::{LiveResponse, PreparedRequest, RequestFingerprint, ResponseOutcome};
use cachet_storage::ResponseCache;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::proxy::ResponseProxy;
use crate::reconcile::{Effect, Reconciler, ResponseSnapshot};

/// Attaches response proxies to live responses.
#[derive(Clone)]
pub struct ReconciliationEngine {
    cache: Arc<ResponseCache>,
}

impl ReconciliationEngine {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }

    /// Get a reference to the response cache.
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Wrap `live` in a proxy and start reconciling it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach(
        &self,
        request: Arc<PreparedRequest>,
        live: Arc<dyn LiveResponse>,
    ) -> ResponseProxy {
        let fingerprint = request.descriptor().fingerprint();
        let (snapshot_tx, snapshot_rx) = watch::channel(ResponseSnapshot::default());

        debug!(
            request_id = %request.id(),
            address = %request.descriptor().address,
            digest = %fingerprint.digest_hex(),
            "Attaching response proxy"
        );

        tokio::spawn(reconcile(
            Arc::clone(&self.cache),
            request.id(),
            fingerprint,
            live.subscribe(),
            snapshot_tx,
        ));

        ResponseProxy::new(request, live, snapshot_rx)
    }
}

/// Drive one request to `Final`, or until nothing more can arrive.
async fn reconcile(
    cache: Arc<ResponseCache>,
    request_id: Uuid,
    fingerprint: RequestFingerprint,
    mut live_rx: watch::Receiver<ResponseOutcome>,
    snapshot_tx: watch::Sender<ResponseSnapshot>,
) {
    let mut reconciler = Reconciler::new();

    // The lookup is never cancelled; once the proxy is final its result is
    // simply not awaited.
    let mut lookup = tokio::spawn({
        let cache = Arc::clone(&cache);
        let fingerprint = fingerprint.clone();
        async move { cache.lookup(&fingerprint).await }
    });
    let mut lookup_done = false;
    let mut live_open = true;

    let initial = live_rx.borrow_and_update().clone();
    let effects = reconciler.observe_live(&initial);
    let mut write_back = publish(effects, &snapshot_tx);

    while !reconciler.is_final() && (!lookup_done || live_open) {
        let effects = tokio::select! {
            joined = &mut lookup, if !lookup_done => {
                lookup_done = true;
                match joined {
                    Ok(Some(cached)) => {
                        debug!(%request_id, status = %cached.status, "LOAD CACHE");
                        let live = live_rx.borrow().clone();
                        let effects = reconciler.load_cached(cached, &live);
                        if !effects.is_empty() {
                            cache.record_hit();
                        }
                        effects
                    }
                    Ok(None) => {
                        debug!(%request_id, "NO CACHE");
                        Vec::new()
                    }
                    Err(e) => {
                        warn!(%request_id, error = %e, "Cache lookup task failed");
                        Vec::new()
                    }
                }
            }
            changed = live_rx.changed(), if live_open => {
                match changed {
                    Ok(()) => {
                        let live = live_rx.borrow_and_update().clone();
                        reconciler.observe_live(&live)
                    }
                    Err(_) => {
                        live_open = false;
                        Vec::new()
                    }
                }
            }
        };
        if let Some(outcome) = publish(effects, &snapshot_tx) {
            write_back = Some(outcome);
        }
    }

    if let Some(outcome) = write_back {
        debug!(%request_id, status = %outcome.status, "CACHING");
        if let Err(e) = cache.write_back(&fingerprint, &outcome).await {
            debug!(%request_id, error = %e, "Write-back dropped");
        }
    }

    debug!(
        %request_id,
        phase = ?reconciler.phase(),
        "Reconciliation finished"
    );
}

/// Send every notification in order and hand back the outcome to persist,
/// if any.
fn publish(
    effects: Vec<Effect>,
    snapshot_tx: &watch::Sender<ResponseSnapshot>,
) -> Option<ResponseOutcome> {
    let mut write_back = None;
    for effect in effects {
        match effect {
            Effect::Notify(snapshot) => {
                snapshot_tx.send_replace(snapshot);
            }
            Effect::WriteBack(outcome) => write_back = Some(outcome),
        }
    }
    write_back
}
