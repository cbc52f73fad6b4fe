//! Cache entry payloads
//!
//! A payload keeps exactly what is needed to reconstruct a response outcome:
//! status, failure flags, sanitised error detail, and the raw body text. The
//! body is re-parsed on the way out according to the request's declared
//! format.

use cachet_core::{BodyFormat, CodecError, ErrorDetail, ResponseBody, ResponseOutcome, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    status: StatusCode,
    #[serde(default)]
    timed_out: bool,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    error_object: Option<ErrorDetail>,
    #[serde(default)]
    is_cancelled: bool,
    #[serde(default)]
    raw_response_text: Option<String>,
}

/// Encodes outcomes into stored payloads and back.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheEntryCodec;

impl CacheEntryCodec {
    pub fn new() -> Self {
        Self
    }

    /// Serialize the persistable part of `outcome`.
    pub fn encode(&self, outcome: &ResponseOutcome) -> Result<String, CodecError> {
        let payload = Payload {
            status: outcome.status,
            timed_out: outcome.timed_out,
            is_error: outcome.is_error,
            error_object: outcome.error.clone(),
            is_cancelled: outcome.cancelled,
            raw_response_text: outcome.body.raw_text().map(str::to_owned),
        };
        serde_json::to_string(&payload).map_err(|e| CodecError::MalformedPayload {
            reason: e.to_string(),
        })
    }

    /// Rebuild an outcome, parsing the stored body as `format`.
    ///
    /// Missing or empty body text decodes to [`ResponseBody::Empty`] without
    /// parsing.
    pub fn decode(&self, payload: &str, format: BodyFormat) -> Result<ResponseOutcome, CodecError> {
        let payload: Payload =
            serde_json::from_str(payload).map_err(|e| CodecError::MalformedPayload {
                reason: e.to_string(),
            })?;

        let body = match payload.raw_response_text {
            Some(raw) if !raw.is_empty() => ResponseBody::parse(raw, format)?,
            _ => ResponseBody::Empty,
        };

        Ok(ResponseOutcome {
            status: payload.status,
            timed_out: payload.timed_out,
            is_error: payload.is_error,
            error: payload.error_object,
            cancelled: payload.is_cancelled,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_field_names() {
        let outcome = ResponseOutcome::failure(500, ErrorDetail::new("server error").with_code(500));
        let encoded = CacheEntryCodec::new().encode(&outcome).expect("encode");
        let json: serde_json::Value = serde_json::from_str(&encoded).expect("payload is json");

        assert_eq!(json["status"], 500);
        assert_eq!(json["timedOut"], false);
        assert_eq!(json["isError"], true);
        assert_eq!(json["isCancelled"], false);
        assert_eq!(json["errorObject"]["message"], "server error");
        assert!(json["rawResponseText"].is_null());
    }

    #[test]
    fn test_json_body_is_reparsed() {
        let codec = CacheEntryCodec::new();
        let body = ResponseBody::parse(r#"{"ok":true}"#.to_string(), BodyFormat::JSON)
            .expect("valid json");
        let outcome = ResponseOutcome::success(200, body);

        let decoded = codec
            .decode(&codec.encode(&outcome).expect("encode"), BodyFormat::JSON)
            .expect("decode");
        assert_eq!(decoded.body.as_json(), Some(&serde_json::json!({"ok": true})));
        assert_eq!(decoded, outcome);
    }

    #[test]
    fn test_document_body_is_reparsed() {
        let codec = CacheEntryCodec::new();
        let body = ResponseBody::parse("<list><item/></list>".to_string(), BodyFormat::XML)
            .expect("valid document");
        let outcome = ResponseOutcome::success(200, body);

        let decoded = codec
            .decode(&codec.encode(&outcome).expect("encode"), BodyFormat::XML)
            .expect("decode");
        let root = decoded.body.as_document().expect("document body");
        assert_eq!(root.name, "list");
    }

    #[test]
    fn test_empty_body_is_not_parsed() {
        let codec = CacheEntryCodec::new();
        let payload = r#"{"status":204,"rawResponseText":""}"#;
        let decoded = codec.decode(payload, BodyFormat::JSON).expect("decode");
        assert_eq!(decoded.status, StatusCode::new(204));
        assert!(decoded.body.is_empty());
    }

    #[test]
    fn test_malformed_payload() {
        let err = CacheEntryCodec::new()
            .decode("not json", BodyFormat::RAW)
            .expect_err("garbage payload");
        assert!(matches!(err, CodecError::MalformedPayload { .. }));

        let err = CacheEntryCodec::new()
            .decode(r#"{"timedOut":false}"#, BodyFormat::RAW)
            .expect_err("status is required");
        assert!(matches!(err, CodecError::MalformedPayload { .. }));
    }

    #[test]
    fn test_unparseable_body_is_an_error() {
        let payload = r#"{"status":200,"rawResponseText":"{broken"}"#;
        let err = CacheEntryCodec::new()
            .decode(payload, BodyFormat::JSON)
            .expect_err("body does not parse");
        assert!(matches!(err, CodecError::InvalidJsonBody { .. }));
    }
}
