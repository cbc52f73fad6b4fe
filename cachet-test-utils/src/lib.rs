//! Cachet Test Utilities
//!
//! Shared test infrastructure for the cachet workspace:
//! - A scripted transport and live response
//! - Proptest generators for request and response types
//! - Fixtures for common scenarios
//! - Assertions on cachet results

pub use cachet_core::{
    BodyFormat, CachetConfig, CachetError, CachetResult, ConfigError, ErrorDetail, HeaderSet,
    LiveResponse, Method, NetworkTransport, PreparedRequest, RequestBody, RequestDescriptor,
    RequestFingerprint, ResponseBody, ResponseOutcome, StatusCode, StorageError, TransportError,
};
pub use cachet_storage::{InMemoryStore, PersistentStore, ResponseCache};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// How often each lifecycle call reached a [`MockLiveResponse`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleCalls {
    pub fire: u32,
    pub invoke_transport: u32,
    pub receive: u32,
    pub cancel: u32,
    pub timeout_reached: u32,
}

/// A live response driven by the test.
///
/// Starts at "not started". The test moves it along with
/// [`set_outcome`](Self::set_outcome) and [`complete`](Self::complete);
/// completing (or cancelling, or timing out) closes the update channel.
pub struct MockLiveResponse {
    request: Arc<PreparedRequest>,
    sender: Mutex<Option<watch::Sender<ResponseOutcome>>>,
    receiver: watch::Receiver<ResponseOutcome>,
    calls: Mutex<LifecycleCalls>,
}

impl MockLiveResponse {
    pub fn new(request: Arc<PreparedRequest>) -> Arc<Self> {
        let (sender, receiver) = watch::channel(ResponseOutcome::default());
        Arc::new(Self {
            request,
            sender: Mutex::new(Some(sender)),
            receiver,
            calls: Mutex::new(LifecycleCalls::default()),
        })
    }

    /// Publish `outcome` without closing. Ignored once closed.
    pub fn set_outcome(&self, outcome: ResponseOutcome) {
        if let Some(sender) = lock(&self.sender).as_ref() {
            sender.send_replace(outcome);
        }
    }

    /// Change only the status. Ignored once closed.
    pub fn set_status(&self, status: impl Into<StatusCode>) {
        let status = status.into();
        if let Some(sender) = lock(&self.sender).as_ref() {
            sender.send_modify(|outcome| outcome.status = status);
        }
    }

    /// Publish `outcome` and close.
    pub fn complete(&self, outcome: ResponseOutcome) {
        if let Some(sender) = lock(&self.sender).take() {
            sender.send_replace(outcome);
        }
    }

    /// Close without publishing anything further.
    pub fn close(&self) {
        lock(&self.sender).take();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.sender).is_none()
    }

    pub fn calls(&self) -> LifecycleCalls {
        *lock(&self.calls)
    }

    fn address(&self) -> String {
        self.request.descriptor().address.clone()
    }
}

impl LiveResponse for MockLiveResponse {
    fn request(&self) -> &Arc<PreparedRequest> {
        &self.request
    }

    fn outcome(&self) -> ResponseOutcome {
        self.receiver.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<ResponseOutcome> {
        self.receiver.clone()
    }

    fn fire(&self) -> CachetResult<()> {
        let mut calls = lock(&self.calls);
        calls.fire += 1;
        if calls.fire > 1 {
            return Err(TransportError::AlreadyFired {
                address: self.address(),
            }
            .into());
        }
        Ok(())
    }

    fn invoke_transport(&self) -> CachetResult<()> {
        let mut calls = lock(&self.calls);
        calls.invoke_transport += 1;
        if calls.fire == 0 {
            return Err(TransportError::NotPrepared {
                address: self.address(),
            }
            .into());
        }
        Ok(())
    }

    fn receive(&self, content: ResponseOutcome) -> CachetResult<()> {
        lock(&self.calls).receive += 1;
        self.complete(content);
        Ok(())
    }

    fn cancel(&self) -> CachetResult<()> {
        lock(&self.calls).cancel += 1;
        if let Some(sender) = lock(&self.sender).take() {
            sender.send_modify(|outcome| outcome.cancelled = true);
        }
        Ok(())
    }

    fn timeout_reached(&self) -> CachetResult<()> {
        lock(&self.calls).timeout_reached += 1;
        self.complete(fixtures::timed_out());
        Ok(())
    }
}

/// A transport that records every send and answers from a queue.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<Arc<MockLiveResponse>>>,
    queued: Mutex<VecDeque<ResponseOutcome>>,
    rejection: Option<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that refuses every request.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            rejection: Some(reason.into()),
            ..Self::default()
        }
    }

    /// The next send completes immediately with `outcome`. Sends beyond the
    /// queue stay pending until the test drives them.
    pub fn queue_response(&self, outcome: ResponseOutcome) {
        lock(&self.queued).push_back(outcome);
    }

    /// Every live response handed out, in send order.
    pub fn sent(&self) -> Vec<Arc<MockLiveResponse>> {
        lock(&self.sent).clone()
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.sent).len()
    }

    pub fn last_sent(&self) -> Option<Arc<MockLiveResponse>> {
        lock(&self.sent).last().cloned()
    }
}

#[async_trait]
impl NetworkTransport for MockTransport {
    async fn send(&self, request: Arc<PreparedRequest>) -> CachetResult<Arc<dyn LiveResponse>> {
        if let Some(reason) = &self.rejection {
            return Err(TransportError::Rejected {
                address: request.descriptor().address.clone(),
                reason: reason.clone(),
            }
            .into());
        }

        let live = MockLiveResponse::new(request);
        if let Some(outcome) = lock(&self.queued).pop_front() {
            live.complete(outcome);
        }
        lock(&self.sent).push(Arc::clone(&live));
        Ok(live as Arc<dyn LiveResponse>)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cachet request and response types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_method() -> impl Strategy<Value = Method> {
        prop_oneof![
            Just(Method::Get),
            Just(Method::Post),
            Just(Method::Put),
            Just(Method::Delete),
            Just(Method::Patch),
            Just(Method::Head),
        ]
    }

    pub fn arb_address() -> impl Strategy<Value = String> {
        "/[a-z0-9]{1,8}(/[a-z0-9]{1,8}){0,3}"
    }

    pub fn arb_header_set() -> impl Strategy<Value = HeaderSet> {
        proptest::collection::btree_map("[A-Z][a-zA-Z-]{0,12}", "[ -~]{0,16}", 0..4)
    }

    pub fn arb_body_format() -> impl Strategy<Value = BodyFormat> {
        (any::<bool>(), any::<bool>()).prop_map(|(is_json, is_xml)| BodyFormat { is_json, is_xml })
    }

    /// Descriptors that pass send-time validation.
    pub fn arb_request_descriptor() -> impl Strategy<Value = RequestDescriptor> {
        (
            arb_method(),
            arb_address(),
            arb_header_set(),
            proptest::option::of("[ -~]{0,32}"),
            arb_body_format(),
        )
            .prop_map(|(method, address, headers, body, format)| {
                let descriptor = RequestDescriptor::new(method, address)
                    .with_headers(headers)
                    .with_format(format);
                match body {
                    Some(body) => descriptor.with_body(body),
                    None => descriptor,
                }
            })
    }

    /// Statuses including the not-started sentinel and a transport failure.
    pub fn arb_status_code() -> impl Strategy<Value = StatusCode> {
        prop_oneof![
            Just(StatusCode::NOT_STARTED),
            Just(StatusCode::new(0)),
            (100..600i32).prop_map(StatusCode::new),
        ]
    }

    pub fn arb_error_detail() -> impl Strategy<Value = ErrorDetail> {
        ("[a-zA-Z ]{1,24}", proptest::option::of(100..600i32)).prop_map(|(message, code)| {
            let detail = ErrorDetail::new(message);
            match code {
                Some(code) => detail.with_code(code),
                None => detail,
            }
        })
    }

    /// Started outcomes with plain-text bodies.
    pub fn arb_text_outcome() -> impl Strategy<Value = ResponseOutcome> {
        (100..600i32, "[ -~]{0,48}", arb_error_detail()).prop_map(|(status, text, error)| {
            if (200..300).contains(&status) {
                ResponseOutcome::success(status, ResponseBody::Text(text))
            } else {
                ResponseOutcome::failure(status, error)
            }
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common test scenarios.

    use super::*;

    /// In-memory configuration with the default retention.
    pub fn test_config() -> CachetConfig {
        CachetConfig::default()
    }

    /// A response cache over a fresh in-memory store. The store is returned
    /// too so tests can inspect rows.
    pub fn memory_cache(config: &CachetConfig) -> (Arc<ResponseCache>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(ResponseCache::new(store.clone(), config));
        (cache, store)
    }

    pub fn get_request(address: &str) -> RequestDescriptor {
        RequestDescriptor::new(Method::Get, address)
    }

    pub fn json_request(address: &str) -> RequestDescriptor {
        RequestDescriptor::new(Method::Get, address)
            .with_header("Accept", "application/json")
            .json(true)
    }

    pub fn ok_text(text: &str) -> ResponseOutcome {
        ResponseOutcome::success(200, ResponseBody::Text(text.to_string()))
    }

    /// A 200 outcome whose body is parsed JSON.
    pub fn ok_json(value: serde_json::Value) -> ResponseOutcome {
        ResponseOutcome::success(
            200,
            ResponseBody::Json {
                raw: value.to_string(),
                value,
            },
        )
    }

    pub fn not_found() -> ResponseOutcome {
        ResponseOutcome::failure(404, ErrorDetail::new("Not Found").with_code(404))
    }

    pub fn server_error() -> ResponseOutcome {
        ResponseOutcome::failure(500, ErrorDetail::new("Internal Server Error").with_code(500))
    }

    pub fn timed_out() -> ResponseOutcome {
        ResponseOutcome::timeout(ErrorDetail::new("Request timed out").with_label("timeout"))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on cachet results.

    use super::*;

    /// Assert that a CachetResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &CachetResult<T>) {
        match result {
            Err(CachetError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a CachetResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &CachetResult<T>) {
        match result {
            Err(CachetError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that a CachetResult is a Transport error.
    #[track_caller]
    pub fn assert_transport_error<T: std::fmt::Debug>(result: &CachetResult<T>) {
        match result {
            Err(CachetError::Transport(_)) => {}
            other => panic!("Expected Transport error, got: {:?}", other),
        }
    }

    /// Assert that two outcomes agree on everything a store round-trip keeps.
    #[track_caller]
    pub fn assert_same_outcome(actual: &ResponseOutcome, expected: &ResponseOutcome) {
        assert_eq!(actual.status, expected.status, "status differs");
        assert_eq!(actual.timed_out, expected.timed_out, "timed_out differs");
        assert_eq!(actual.is_error, expected.is_error, "is_error differs");
        assert_eq!(actual.error, expected.error, "error detail differs");
        assert_eq!(actual.cancelled, expected.cancelled, "cancelled differs");
        assert_eq!(actual.body.raw_text(), expected.body.raw_text(), "body text differs");
    }
}
