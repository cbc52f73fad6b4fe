//! Request dispatch.

use std::fmt;
use std::sync::Arc;

use cachet_core::{
    CachetConfig, CachetResult, LiveResponse, NetworkTransport, PreparedRequest, ResponseOutcome,
};
use cachet_storage::{open_store, ResponseCache};
use tracing::debug;

use crate::engine::ReconciliationEngine;
use crate::proxy::ResponseProxy;

/// What a send hands back to the caller.
#[derive(Clone)]
pub enum SentResponse {
    /// Caching was off: the transport's own handle.
    Live(Arc<dyn LiveResponse>),
    /// Caching was on: a proxy reconciling stored and live outcomes.
    Cached(ResponseProxy),
}

impl fmt::Debug for SentResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            SentResponse::Live(_) => "Live",
            SentResponse::Cached(_) => "Cached",
        };
        f.debug_struct("SentResponse")
            .field("kind", &variant)
            .field("request_id", &self.request().id())
            .field("status", &self.outcome().status)
            .finish()
    }
}

impl SentResponse {
    pub fn as_proxy(&self) -> Option<&ResponseProxy> {
        match self {
            SentResponse::Cached(proxy) => Some(proxy),
            SentResponse::Live(_) => None,
        }
    }

    pub fn into_proxy(self) -> Option<ResponseProxy> {
        match self {
            SentResponse::Cached(proxy) => Some(proxy),
            SentResponse::Live(_) => None,
        }
    }

    /// The transport's handle, whether or not it is wrapped.
    pub fn live(&self) -> &Arc<dyn LiveResponse> {
        match self {
            SentResponse::Live(live) => live,
            SentResponse::Cached(proxy) => proxy.live(),
        }
    }

    /// Current outcome as the caller sees it.
    pub fn outcome(&self) -> ResponseOutcome {
        match self {
            SentResponse::Live(live) => live.outcome(),
            SentResponse::Cached(proxy) => proxy.outcome(),
        }
    }

    pub fn request(&self) -> &Arc<PreparedRequest> {
        match self {
            SentResponse::Live(live) => live.request(),
            SentResponse::Cached(proxy) => proxy.request(),
        }
    }
}

/// Sends prepared requests, wrapping cacheable ones in a proxy.
pub struct RequestManager {
    transport: Arc<dyn NetworkTransport>,
    engine: ReconciliationEngine,
    config: CachetConfig,
}

impl RequestManager {
    pub fn new(
        transport: Arc<dyn NetworkTransport>,
        cache: Arc<ResponseCache>,
        config: CachetConfig,
    ) -> Self {
        Self {
            transport,
            engine: ReconciliationEngine::new(cache),
            config,
        }
    }

    /// Validate `config`, open the store it describes and build a manager
    /// over it.
    pub fn from_config(
        transport: Arc<dyn NetworkTransport>,
        config: CachetConfig,
    ) -> CachetResult<Self> {
        config.validate()?;
        let store = open_store(&config)?;
        let cache = Arc::new(ResponseCache::new(store, &config));
        Ok(Self::new(transport, cache, config))
    }

    pub fn config(&self) -> &CachetConfig {
        &self.config
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    /// Get a reference to the response cache.
    pub fn cache(&self) -> &Arc<ResponseCache> {
        self.engine.cache()
    }

    /// Send `request`. The transport is always asked for a live response;
    /// cacheable requests get it wrapped in a proxy.
    pub async fn send_request(&self, request: Arc<PreparedRequest>) -> CachetResult<SentResponse> {
        let live = self.transport.send(Arc::clone(&request)).await?;

        if !request.descriptor().can_cache {
            debug!(
                request_id = %request.id(),
                address = %request.descriptor().address,
                "Caching disabled for request"
            );
            return Ok(SentResponse::Live(live));
        }

        Ok(SentResponse::Cached(self.engine.attach(request, live)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cachet_core::{CachetError, Method, RequestDescriptor, TransportError};
    use cachet_storage::InMemoryStore;
    use cachet_test_utils::MockTransport;

    fn manager(transport: Arc<MockTransport>) -> RequestManager {
        let config = CachetConfig::default();
        let cache = Arc::new(ResponseCache::new(Arc::new(InMemoryStore::new()), &config));
        RequestManager::new(transport, cache, config)
    }

    #[tokio::test]
    async fn test_uncacheable_request_gets_live_handle() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(transport.clone());
        let request = Arc::new(RequestDescriptor::new(Method::Get, "/live").cacheable(false)).prepare();

        let sent = manager
            .send_request(request)
            .await
            .expect("send should succeed");
        assert!(sent.as_proxy().is_none());
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_cacheable_request_gets_proxy() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(transport.clone());
        let request = Arc::new(RequestDescriptor::new(Method::Get, "/cached")).prepare();

        let sent = manager
            .send_request(Arc::clone(&request))
            .await
            .expect("send should succeed");
        let proxy = sent.as_proxy().expect("cacheable requests are proxied");
        assert!(Arc::ptr_eq(proxy.request(), &request));
        assert_eq!(transport.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_debug_names_variant_and_request() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager(transport);
        let request = Arc::new(RequestDescriptor::new(Method::Get, "/debug").cacheable(false)).prepare();
        let id = request.id();

        let sent = manager
            .send_request(request)
            .await
            .expect("send should succeed");
        let rendered = format!("{:?}", sent);
        assert!(rendered.contains("Live"));
        assert!(rendered.contains(&id.to_string()));
    }

    #[tokio::test]
    async fn test_transport_rejection_propagates() {
        let transport = Arc::new(MockTransport::rejecting("offline"));
        let manager = manager(transport);
        let request = Arc::new(RequestDescriptor::new(Method::Get, "/down")).prepare();

        let err = manager
            .send_request(request)
            .await
            .expect_err("rejected send");
        assert!(matches!(
            err,
            CachetError::Transport(TransportError::Rejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid_config() {
        let transport = Arc::new(MockTransport::new());
        let result = RequestManager::from_config(transport, CachetConfig::new().with_max_entries(0));
        assert!(matches!(result, Err(CachetError::Config(_))));
    }
}
