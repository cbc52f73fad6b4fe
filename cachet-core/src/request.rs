//! Request descriptors
//!
//! A [`RequestDescriptor`] is an immutable description of an outbound request.
//! Sending never mutates it: the request surface prepares a copy
//! ([`PreparedRequest`]) that keeps a weak back-reference to the descriptor it
//! was copied from, which is how a fresh descriptor is told apart from one that
//! has already been handed to a transport.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use uuid::Uuid;

use crate::{CachetResult, ConfigError};

/// Request headers, ordered by name so that their serialization is canonical.
pub type HeaderSet = BTreeMap<String, String>;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
}

impl Method {
    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared format of a response body.
///
/// Both flags take part in the cache key. When a stored body is re-parsed the
/// document flag is checked first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyFormat {
    /// Body is structured JSON.
    pub is_json: bool,
    /// Body is an XML-like document.
    pub is_xml: bool,
}

impl BodyFormat {
    /// Raw text, no parsing.
    pub const RAW: BodyFormat = BodyFormat {
        is_json: false,
        is_xml: false,
    };

    /// Structured JSON.
    pub const JSON: BodyFormat = BodyFormat {
        is_json: true,
        is_xml: false,
    };

    /// XML-like document.
    pub const XML: BodyFormat = BodyFormat {
        is_json: false,
        is_xml: true,
    };
}

/// Body attached to an outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestBody {
    /// Opaque text, sent as-is.
    Text(String),
    /// A JSON value, serialized before sending.
    Json(serde_json::Value),
}

impl RequestBody {
    /// The text that goes on the wire.
    pub fn to_wire_string(&self) -> String {
        match self {
            RequestBody::Text(text) => text.clone(),
            RequestBody::Json(value) => value.to_string(),
        }
    }

    /// Empty text or a JSON `null`: nothing worth sending.
    pub fn is_blank(&self) -> bool {
        match self {
            RequestBody::Text(text) => text.is_empty(),
            RequestBody::Json(value) => value.is_null(),
        }
    }
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        RequestBody::Text(value.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        RequestBody::Text(value)
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

/// Immutable description of an outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub address: String,
    pub method: Method,
    pub headers: HeaderSet,
    pub body: Option<RequestBody>,
    pub format: BodyFormat,
    pub is_asynchronous: bool,
    pub timeout: Option<Duration>,
    /// Whether responses to this request go through the response cache.
    pub can_cache: bool,
}

impl RequestDescriptor {
    /// Create a descriptor with no headers, no body and raw-text responses.
    pub fn new(method: Method, address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            method,
            headers: HeaderSet::new(),
            body: None,
            format: BodyFormat::RAW,
            is_asynchronous: true,
            timeout: None,
            can_cache: true,
        }
    }

    /// Add a single header, replacing any previous value for the name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replace the header set.
    pub fn with_headers(mut self, headers: HeaderSet) -> Self {
        self.headers = headers;
        self
    }

    /// Set the request body.
    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Declare the response body format.
    pub fn with_format(mut self, format: BodyFormat) -> Self {
        self.format = format;
        self
    }

    /// Toggle structured-JSON responses.
    pub fn json(mut self, flag: bool) -> Self {
        self.format.is_json = flag;
        self
    }

    /// Toggle document responses.
    pub fn xml(mut self, flag: bool) -> Self {
        self.format.is_xml = flag;
        self
    }

    /// Toggle asynchronous sending.
    pub fn asynchronous(mut self, flag: bool) -> Self {
        self.is_asynchronous = flag;
        self
    }

    /// Set (or clear) the transport timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Toggle caching.
    pub fn cacheable(mut self, flag: bool) -> Self {
        self.can_cache = flag;
        self
    }

    /// The body as it goes on the wire, if any.
    pub fn body_string(&self) -> Option<String> {
        self.body.as_ref().map(RequestBody::to_wire_string)
    }

    /// Check the timeout/synchrony combination before sending.
    ///
    /// A timeout cannot be honoured by a synchronous request, and a timeout
    /// of exactly zero is never meaningful.
    pub fn validate_for_send(&self) -> CachetResult<()> {
        match self.timeout {
            Some(timeout) if timeout.is_zero() => Err(ConfigError::ZeroTimeout.into()),
            Some(_) if !self.is_asynchronous => Err(ConfigError::TimeoutOnSynchronous.into()),
            _ => Ok(()),
        }
    }

    /// Copy this descriptor into a request ready for a transport.
    pub fn prepare(self: &Arc<Self>) -> Arc<PreparedRequest> {
        Arc::new(PreparedRequest {
            id: Uuid::now_v7(),
            descriptor: self.as_ref().clone(),
            source: Arc::downgrade(self),
        })
    }
}

/// A descriptor copy that has been handed to (or is about to be handed to) a
/// transport.
#[derive(Debug)]
pub struct PreparedRequest {
    id: Uuid,
    descriptor: RequestDescriptor,
    source: Weak<RequestDescriptor>,
}

impl PreparedRequest {
    /// Identifier used to correlate log lines for this send.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The copied descriptor.
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// The descriptor this request was copied from, if it is still alive.
    pub fn source(&self) -> Option<Arc<RequestDescriptor>> {
        self.source.upgrade()
    }
}
