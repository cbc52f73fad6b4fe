//! Outbound transport contract
//!
//! The transport owns the network round-trip. A [`LiveResponse`] is its
//! handle for one request: the current outcome is published on a watch
//! channel, and the channel closes once the outcome can no longer change.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::{CachetResult, PreparedRequest, ResponseOutcome};

/// Issues requests on the network.
#[async_trait]
pub trait NetworkTransport: Send + Sync {
    /// Hand `request` to the network layer and return its live handle.
    ///
    /// The returned handle starts at [`crate::StatusCode::NOT_STARTED`] unless
    /// the transport already has a result.
    async fn send(&self, request: Arc<PreparedRequest>) -> CachetResult<Arc<dyn LiveResponse>>;
}

/// The transport's handle for one in-flight request.
pub trait LiveResponse: Send + Sync {
    /// The request this response belongs to.
    fn request(&self) -> &Arc<PreparedRequest>;

    /// Current outcome.
    fn outcome(&self) -> ResponseOutcome;

    /// Receiver of outcome updates. The sender is dropped once the response is
    /// complete, cancelled, or timed out.
    fn subscribe(&self) -> watch::Receiver<ResponseOutcome>;

    /// Start the request.
    fn fire(&self) -> CachetResult<()>;

    /// Perform the network call of a fired request.
    fn invoke_transport(&self) -> CachetResult<()>;

    /// Deliver the transport's result for this request.
    fn receive(&self, content: ResponseOutcome) -> CachetResult<()>;

    /// Abort the request.
    fn cancel(&self) -> CachetResult<()>;

    /// Signal that the request's timeout elapsed.
    fn timeout_reached(&self) -> CachetResult<()>;
}
