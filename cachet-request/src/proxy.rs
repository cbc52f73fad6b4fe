//! The caller-facing response object for cacheable requests.

use std::sync::Arc;

use cachet_core::{CachetResult, LiveResponse, PreparedRequest, ResponseOutcome, StatusCode};
use tokio::sync::watch;

use crate::reconcile::ResponseSnapshot;

/// A response that may show a stored outcome until the live one lands.
///
/// Read fields after a change notification; right after `send` returns
/// nothing has been reconciled yet. Lifecycle calls go straight to the live
/// response.
#[derive(Clone)]
pub struct ResponseProxy {
    request: Arc<PreparedRequest>,
    live: Arc<dyn LiveResponse>,
    snapshot_rx: watch::Receiver<ResponseSnapshot>,
}

impl std::fmt::Debug for ResponseProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseProxy")
            .field("request_id", &self.request.id())
            .field("snapshot", &*self.snapshot_rx.borrow())
            .finish()
    }
}

impl ResponseProxy {
    pub(crate) fn new(
        request: Arc<PreparedRequest>,
        live: Arc<dyn LiveResponse>,
        snapshot_rx: watch::Receiver<ResponseSnapshot>,
    ) -> Self {
        Self {
            request,
            live,
            snapshot_rx,
        }
    }

    pub fn request(&self) -> &Arc<PreparedRequest> {
        &self.request
    }

    /// The live response this proxy relays to.
    pub fn live(&self) -> &Arc<dyn LiveResponse> {
        &self.live
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> ResponseSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn outcome(&self) -> ResponseOutcome {
        self.snapshot_rx.borrow().outcome.clone()
    }

    pub fn status(&self) -> StatusCode {
        self.snapshot_rx.borrow().outcome.status
    }

    pub fn is_cached(&self) -> bool {
        self.snapshot_rx.borrow().is_cached
    }

    pub fn is_final(&self) -> bool {
        self.snapshot_rx.borrow().is_final
    }

    /// A fresh receiver of change notifications.
    pub fn subscribe(&self) -> watch::Receiver<ResponseSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Wait for the next change. `None` once reconciliation has finished and
    /// no further change can happen.
    pub async fn changed(&mut self) -> Option<ResponseSnapshot> {
        self.snapshot_rx.changed().await.ok()?;
        Some(self.snapshot_rx.borrow_and_update().clone())
    }

    /// Wait until reconciliation has finished, including any write-back, and
    /// return the last snapshot.
    pub async fn settled(&self) -> ResponseSnapshot {
        let mut rx = self.snapshot_rx.clone();
        while rx.changed().await.is_ok() {}
        let snapshot = rx.borrow().clone();
        snapshot
    }

    pub fn fire(&self) -> CachetResult<()> {
        self.live.fire()
    }

    pub fn invoke_transport(&self) -> CachetResult<()> {
        self.live.invoke_transport()
    }

    pub fn receive(&self, content: ResponseOutcome) -> CachetResult<()> {
        self.live.receive(content)
    }

    pub fn cancel(&self) -> CachetResult<()> {
        self.live.cancel()
    }

    pub fn timeout_reached(&self) -> CachetResult<()> {
        self.live.timeout_reached()
    }
}
