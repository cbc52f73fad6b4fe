//! Cacheable request surface
//!
//! [`CacheableRequest`] is what application code builds and sends. It keeps
//! an editable descriptor; every `send` hands the manager a prepared copy, so
//! later edits never affect a request already in flight.

use std::sync::Arc;
use std::time::Duration;

use cachet_core::{
    BodyFormat, CachetResult, Method, PreparedRequest, RequestBody, RequestDescriptor,
};
use tracing::debug;

use crate::manager::{RequestManager, SentResponse};

/// A request with a cache on/off switch.
///
/// # Example
///
/// ```ignore
/// let mut request = CacheableRequest::get_url(&manager, "/api/feed").json(true);
/// let sent = request.send(None).await?;
/// if let Some(mut proxy) = sent.into_proxy() {
///     while let Some(snapshot) = proxy.changed().await {
///         render(&snapshot.outcome);
///     }
/// }
/// ```
#[derive(Clone)]
pub struct CacheableRequest {
    manager: Arc<RequestManager>,
    descriptor: Arc<RequestDescriptor>,
    prepared: Option<Arc<PreparedRequest>>,
}

impl CacheableRequest {
    /// Wrap `descriptor` as is, keeping its cache flag.
    pub fn new(manager: Arc<RequestManager>, descriptor: RequestDescriptor) -> Self {
        Self {
            manager,
            descriptor: Arc::new(descriptor),
            prepared: None,
        }
    }

    /// A request whose cache flag follows the manager's configuration.
    pub fn with_method(
        manager: &Arc<RequestManager>,
        method: Method,
        address: impl Into<String>,
    ) -> Self {
        let descriptor = RequestDescriptor::new(method, address)
            .cacheable(manager.config().cache_by_default);
        Self::new(Arc::clone(manager), descriptor)
    }

    pub fn get_url(manager: &Arc<RequestManager>, address: impl Into<String>) -> Self {
        Self::with_method(manager, Method::Get, address)
    }

    pub fn post_url(manager: &Arc<RequestManager>, address: impl Into<String>) -> Self {
        Self::with_method(manager, Method::Post, address)
    }

    pub fn put_url(manager: &Arc<RequestManager>, address: impl Into<String>) -> Self {
        Self::with_method(manager, Method::Put, address)
    }

    pub fn delete_url(manager: &Arc<RequestManager>, address: impl Into<String>) -> Self {
        Self::with_method(manager, Method::Delete, address)
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// The copy handed to the manager by the last send, if any.
    pub fn prepared(&self) -> Option<&Arc<PreparedRequest>> {
        self.prepared.as_ref()
    }

    fn edit(mut self, apply: impl FnOnce(&mut RequestDescriptor)) -> Self {
        apply(Arc::make_mut(&mut self.descriptor));
        self
    }

    /// Turn caching on or off.
    pub fn cache(self, flag: bool) -> Self {
        self.edit(|d| d.can_cache = flag)
    }

    /// Turn caching on.
    pub fn cache_on(self) -> Self {
        self.cache(true)
    }

    pub fn can_cache(&self) -> bool {
        self.descriptor.can_cache
    }

    pub fn header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        self.edit(|d| {
            d.headers.insert(name, value);
        })
    }

    pub fn json(self, flag: bool) -> Self {
        self.edit(|d| d.format.is_json = flag)
    }

    pub fn xml(self, flag: bool) -> Self {
        self.edit(|d| d.format.is_xml = flag)
    }

    pub fn format(self, format: BodyFormat) -> Self {
        self.edit(|d| d.format = format)
    }

    pub fn asynchronous(self, flag: bool) -> Self {
        self.edit(|d| d.is_asynchronous = flag)
    }

    pub fn timeout(self, timeout: Option<Duration>) -> Self {
        self.edit(|d| d.timeout = timeout)
    }

    /// Send a prepared copy of this request.
    ///
    /// A body, when given and not blank, replaces the descriptor's body
    /// first. A blank body leaves the existing one in place.
    ///
    /// # Errors
    ///
    /// Fails before anything is sent if a timeout is set on a synchronous
    /// request or the timeout is zero. Transport errors are returned as is.
    pub async fn send(&mut self, body: Option<RequestBody>) -> CachetResult<SentResponse> {
        self.descriptor.validate_for_send()?;
        if let Some(body) = body.filter(|b| !b.is_blank()) {
            Arc::make_mut(&mut self.descriptor).body = Some(body);
        }

        let prepared = self.descriptor.prepare();
        self.prepared = Some(Arc::clone(&prepared));
        debug!(
            request_id = %prepared.id(),
            method = %self.descriptor.method,
            address = %self.descriptor.address,
            cacheable = self.descriptor.can_cache,
            "Sending request"
        );
        self.manager.send_request(prepared).await
    }

    /// Send again without touching the body.
    ///
    /// Reuses the copy prepared by the previous send when it is still linked
    /// to this descriptor; otherwise behaves like [`send`](Self::send).
    pub async fn resend(&mut self) -> CachetResult<SentResponse> {
        let reusable = self
            .prepared
            .as_ref()
            .filter(|prepared| {
                prepared
                    .source()
                    .is_some_and(|source| Arc::ptr_eq(&source, &self.descriptor))
            })
            .cloned();

        match reusable {
            Some(prepared) => {
                debug!(request_id = %prepared.id(), "Resending prepared request");
                self.manager.send_request(prepared).await
            }
            None => self.send(None).await,
        }
    }
}
