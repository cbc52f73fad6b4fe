//! Response outcomes
//!
//! The outcome of a request is plain data: a status, a few failure flags and a
//! body. A failed network round-trip is an outcome like any other.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BodyFormat, CodecError};

/// HTTP status of a response, with a sentinel for "not yet started".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(i32);

impl StatusCode {
    /// The transport has not produced a status yet.
    pub const NOT_STARTED: StatusCode = StatusCode(-100);
    pub const OK: StatusCode = StatusCode(200);
    pub const NOT_FOUND: StatusCode = StatusCode(404);

    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    pub const fn as_i32(&self) -> i32 {
        self.0
    }

    /// Returns true once the transport has reported a real status.
    pub fn is_started(&self) -> bool {
        *self != Self::NOT_STARTED
    }

    /// Status in [200, 300).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::NOT_STARTED
    }
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error information attached to a failed response.
///
/// Only descriptive fields are kept; the failing value itself is never
/// retained, so an outcome can always be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            label: None,
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A response body, parsed according to the request's declared format.
///
/// Parsed variants keep the raw text they were parsed from; the raw text is
/// what gets persisted.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Text(String),
    Json {
        raw: String,
        value: serde_json::Value,
    },
    Document {
        raw: String,
        root: xmltree::Element,
    },
}

impl ResponseBody {
    /// Parse raw response text according to `format`.
    ///
    /// The document flag wins when both flags are set. Without either flag the
    /// text is returned unchanged.
    pub fn parse(raw: String, format: BodyFormat) -> Result<Self, CodecError> {
        if format.is_xml {
            let root = xmltree::Element::parse(raw.as_bytes()).map_err(|e| {
                CodecError::InvalidDocumentBody {
                    reason: e.to_string(),
                }
            })?;
            Ok(ResponseBody::Document { raw, root })
        } else if format.is_json {
            let value = serde_json::from_str(&raw).map_err(|e| CodecError::InvalidJsonBody {
                reason: e.to_string(),
            })?;
            Ok(ResponseBody::Json { raw, value })
        } else {
            Ok(ResponseBody::Text(raw))
        }
    }

    /// The unparsed text of this body.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Empty => None,
            ResponseBody::Text(raw)
            | ResponseBody::Json { raw, .. }
            | ResponseBody::Document { raw, .. } => Some(raw),
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Json { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&xmltree::Element> {
        match self {
            ResponseBody::Document { root, .. } => Some(root),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}

/// Everything a caller can observe about how a request turned out.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseOutcome {
    pub status: StatusCode,
    pub timed_out: bool,
    pub is_error: bool,
    pub error: Option<ErrorDetail>,
    pub cancelled: bool,
    pub body: ResponseBody,
}

impl ResponseOutcome {
    /// An outcome with the given status and no body.
    pub fn with_status(status: impl Into<StatusCode>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    /// A successful outcome carrying `body`.
    pub fn success(status: impl Into<StatusCode>, body: ResponseBody) -> Self {
        Self {
            status: status.into(),
            body,
            ..Self::default()
        }
    }

    /// A failed outcome.
    pub fn failure(status: impl Into<StatusCode>, error: ErrorDetail) -> Self {
        Self {
            status: status.into(),
            is_error: true,
            error: Some(error),
            ..Self::default()
        }
    }

    /// A transport timeout.
    pub fn timeout(error: ErrorDetail) -> Self {
        Self {
            status: StatusCode::new(0),
            timed_out: true,
            is_error: true,
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(!StatusCode::NOT_STARTED.is_started());
        assert!(!StatusCode::NOT_STARTED.is_success());
        assert!(StatusCode::new(200).is_success());
        assert!(StatusCode::new(299).is_success());
        assert!(!StatusCode::new(300).is_success());
        assert!(!StatusCode::new(199).is_success());
        assert!(StatusCode::new(0).is_started());
        assert_eq!(StatusCode::default(), StatusCode::NOT_STARTED);
    }

    #[test]
    fn test_parse_raw_text_unchanged() {
        let body = ResponseBody::parse("<not parsed>".to_string(), BodyFormat::RAW)
            .expect("raw text always parses");
        assert_eq!(body, ResponseBody::Text("<not parsed>".to_string()));
        assert_eq!(body.raw_text(), Some("<not parsed>"));
    }

    #[test]
    fn test_parse_json_body() {
        let body = ResponseBody::parse(r#"{"items":[1,2]}"#.to_string(), BodyFormat::JSON)
            .expect("valid json");
        assert_eq!(
            body.as_json(),
            Some(&serde_json::json!({"items": [1, 2]}))
        );
        assert_eq!(body.raw_text(), Some(r#"{"items":[1,2]}"#));
    }

    #[test]
    fn test_parse_document_body() {
        let body = ResponseBody::parse("<feed><entry/></feed>".to_string(), BodyFormat::XML)
            .expect("valid document");
        let root = body.as_document().expect("document body");
        assert_eq!(root.name, "feed");
        assert!(root.get_child("entry").is_some());
    }

    #[test]
    fn test_document_flag_wins_over_json() {
        let format = BodyFormat {
            is_json: true,
            is_xml: true,
        };
        let body = ResponseBody::parse("<a/>".to_string(), format).expect("valid document");
        assert!(body.as_document().is_some());
    }

    #[test]
    fn test_parse_failures_are_codec_errors() {
        let err = ResponseBody::parse("{oops".to_string(), BodyFormat::JSON).unwrap_err();
        assert!(matches!(err, CodecError::InvalidJsonBody { .. }));

        let err = ResponseBody::parse("<open>".to_string(), BodyFormat::XML).unwrap_err();
        assert!(matches!(err, CodecError::InvalidDocumentBody { .. }));
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = ResponseOutcome::success(200, ResponseBody::Text("hi".into()));
        assert!(ok.is_success());
        assert!(!ok.is_error);

        let failed = ResponseOutcome::failure(404, ErrorDetail::new("not found"));
        assert!(!failed.is_success());
        assert!(failed.is_error);

        let timed_out = ResponseOutcome::timeout(ErrorDetail::new("timeout"));
        assert!(timed_out.timed_out);
        assert!(timed_out.status.is_started());
    }
}
