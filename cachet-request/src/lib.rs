//! Cachet Request - Cacheable Requests with Reconciled Responses
//!
//! Sending a cacheable request returns a [`ResponseProxy`] at once. The proxy
//! shows the stored outcome for the same request as soon as the store lookup
//! resolves, then switches to the live outcome when it is at least as good,
//! and persists that outcome for next time.
//!
//! ```ignore
//! let manager = Arc::new(RequestManager::from_config(transport, CachetConfig::from_env()?)?);
//! let mut request = CacheableRequest::get_url(&manager, "/api/feed").json(true);
//! let sent = request.send(None).await?;
//! ```

pub mod engine;
pub mod facade;
pub mod manager;
pub mod proxy;
pub mod reconcile;
pub mod telemetry;

pub use engine::ReconciliationEngine;
pub use facade::CacheableRequest;
pub use manager::{RequestManager, SentResponse};
pub use proxy::ResponseProxy;
pub use reconcile::{should_supersede, Effect, Phase, Reconciler, ResponseSnapshot};
pub use telemetry::{init_tracing, TelemetryConfig};

// Re-export the types every caller of the request surface touches
pub use cachet_core::{
    BodyFormat, CachetConfig, CachetError, CachetResult, LiveResponse, Method, NetworkTransport,
    RequestBody, RequestDescriptor, ResponseBody, ResponseOutcome, StatusCode,
};
