//! # flagsync-abi
//!
//! Shared wire types for the flagsync guest/host ABI.
//!
//! This crate defines the envelope and structured message types that cross
//! the WASM boundary between the host (`flagsync-bridge`) and the guest
//! resolver module. Structured payloads are serialized as JSON inside the
//! envelope's opaque byte fields.
//!
//! ## Design principles
//!
//! - **Pure data**: no I/O, no async, no platform-specific code.
//! - **Serde only**: just `serde`, same as the rest of the ABI boundary.
//! - **Compiles everywhere**: native and `wasm32-unknown-unknown`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// Envelope
// =============================================================================

/// A message sent from host to guest.
///
/// Wraps an inner, already-serialized payload. The guest unwraps this before
/// interpreting `data` as one of the structured message types below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub data: Vec<u8>,
}

/// A message returned from guest to host, or from a host-imported function
/// back to the guest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Data(Vec<u8>),
    Error(String),
}

impl Response {
    pub fn ok(data: Vec<u8>) -> Self {
        Response::Data(data)
    }

    pub fn err(message: impl Into<String>) -> Self {
        Response::Error(message.into())
    }

    /// Consume the response, turning a guest-reported error into `Err`.
    pub fn into_result(self) -> Result<Vec<u8>, String> {
        match self {
            Response::Data(d) => Ok(d),
            Response::Error(e) => Err(e),
        }
    }
}

/// The on-wire tag byte for [`Response`] variants.
const TAG_RESPONSE_DATA: u8 = 1;
const TAG_RESPONSE_ERROR: u8 = 2;
const TAG_REQUEST: u8 = 0;

/// Encode a [`Request`] as `tag(1) | len(4, LE) | bytes`.
pub fn encode_request(req: &Request) -> Vec<u8> {
    encode_tagged(TAG_REQUEST, &req.data)
}

/// Encode a [`Response`] the same way, with a distinct tag for the error arm.
pub fn encode_response(resp: &Response) -> Vec<u8> {
    match resp {
        Response::Data(d) => encode_tagged(TAG_RESPONSE_DATA, d),
        Response::Error(e) => encode_tagged(TAG_RESPONSE_ERROR, e.as_bytes()),
    }
}

fn encode_tagged(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + payload.len());
    out.push(tag);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

/// Errors decoding a tagged envelope from raw bytes.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvelopeDecodeError {
    #[error("envelope too short: {0} bytes")]
    TooShort(usize),
    #[error("unknown envelope tag: {0}")]
    UnknownTag(u8),
    #[error("declared length {declared} exceeds remaining {remaining} bytes")]
    LengthMismatch { declared: usize, remaining: usize },
    #[error("error payload is not valid UTF-8")]
    InvalidUtf8,
}

/// Decode a [`Response`] from the tagged wire format.
pub fn decode_response(bytes: &[u8]) -> Result<Response, EnvelopeDecodeError> {
    let (tag, payload) = decode_tagged(bytes)?;
    match tag {
        TAG_RESPONSE_DATA => Ok(Response::Data(payload.to_vec())),
        TAG_RESPONSE_ERROR => {
            let s =
                std::str::from_utf8(payload).map_err(|_| EnvelopeDecodeError::InvalidUtf8)?;
            Ok(Response::Error(s.to_string()))
        }
        other => Err(EnvelopeDecodeError::UnknownTag(other)),
    }
}

/// Decode a [`Request`] from the tagged wire format (used by test guests).
pub fn decode_request(bytes: &[u8]) -> Result<Request, EnvelopeDecodeError> {
    let (tag, payload) = decode_tagged(bytes)?;
    if tag != TAG_REQUEST {
        return Err(EnvelopeDecodeError::UnknownTag(tag));
    }
    Ok(Request {
        data: payload.to_vec(),
    })
}

fn decode_tagged(bytes: &[u8]) -> Result<(u8, &[u8]), EnvelopeDecodeError> {
    if bytes.len() < 5 {
        return Err(EnvelopeDecodeError::TooShort(bytes.len()));
    }
    let tag = bytes[0];
    let len = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    let remaining = bytes.len() - 5;
    if len > remaining {
        return Err(EnvelopeDecodeError::LengthMismatch {
            declared: len,
            remaining,
        });
    }
    Ok((tag, &bytes[5..5 + len]))
}

// =============================================================================
// Dynamic value model (façade-facing, but defined here so both the bridge's
// structured request/response and the provider can share it without a cycle)
// =============================================================================

/// A dynamically typed flag value or evaluation-context attribute.
///
/// See DESIGN NOTES §9 ("Dynamic value representation"): re-architected as a
/// tagged sum over the scalar/collection kinds, rather than the source's
/// untyped structured-value tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Navigate a dot-path of already-split segments into this value.
    ///
    /// Returns `None` if any segment is missing or the value at that point
    /// is not a map.
    pub fn navigate(&self, path: &[String]) -> Option<&Value> {
        let mut current = self;
        for segment in path {
            match current {
                Value::Map(m) => current = m.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }
}

/// Attributes describing the subject of a flag evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub targeting_key: Option<String>,
    pub attributes: BTreeMap<String, Value>,
}

// =============================================================================
// Structured resolve protocol: opaque bytes from the bridge's point of view,
// but the façade must construct and parse it on the host side of the
// boundary.
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStateRequest {
    pub account_id: String,
    pub state: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub flags: Vec<String>,
    pub client_secret: String,
    pub apply: bool,
    pub context: EvaluationContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveWithStickyRequest {
    pub resolve: ResolveRequest,
    pub fail_fast_on_sticky: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveReason {
    Match,
    NoSegmentMatch,
    FlagArchived,
    TargetingKeyError,
    Error,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedFlag {
    pub flag: String,
    pub value: Value,
    pub variant: String,
    pub reason: ResolveReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveSuccess {
    pub resolved_flags: Vec<ResolvedFlag>,
}

/// The guest's answer to `resolve_with_sticky`: either a normal resolution,
/// or a signal that it lacks the sticky/materialization state to answer
/// locally ("missing dependency" response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResolveWithStickyResponse {
    Success(ResolveSuccess),
    MissingMaterializations,
}

// =============================================================================
// ABI function names (exported by the guest, imported by the guest)
// =============================================================================

pub mod guest_exports {
    pub const ALLOC: &str = "alloc";
    pub const FREE: &str = "free";
    pub const SET_RESOLVER_STATE: &str = "set_resolver_state";
    pub const RESOLVE_WITH_STICKY: &str = "resolve_with_sticky";
    pub const FLUSH_LOGS: &str = "flush_logs";
    pub const MEMORY: &str = "memory";
}

pub mod guest_imports {
    pub const CURRENT_TIME: &str = "current_time";
    pub const LOG_RESOLVE: &str = "log_resolve";
    pub const LOG_ASSIGN: &str = "log_assign";
    pub const CURRENT_THREAD_ID: &str = "current_thread_id";
    pub const MODULE: &str = "env";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_request() {
        let req = Request {
            data: vec![1, 2, 3, 4],
        };
        let bytes = encode_request(&req);
        let decoded = decode_request(&bytes).unwrap();
        assert_eq!(decoded.data, req.data);
    }

    #[test]
    fn round_trips_response_data() {
        let resp = Response::ok(vec![9, 9, 9]);
        let bytes = encode_response(&resp);
        let decoded = decode_response(&bytes).unwrap();
        assert_eq!(decoded.into_result().unwrap(), vec![9, 9, 9]);
    }

    #[test]
    fn round_trips_response_error() {
        let resp = Response::err("boom");
        let bytes = encode_response(&resp);
        let decoded = decode_response(&bytes).unwrap();
        assert_eq!(decoded.into_result().unwrap_err(), "boom");
    }

    #[test]
    fn rejects_truncated_envelope() {
        assert_eq!(
            decode_response(&[1, 0, 0, 0]),
            Err(EnvelopeDecodeError::TooShort(4))
        );
    }

    #[test]
    fn rejects_length_overrun() {
        let bytes = vec![1, 255, 0, 0, 0, 1, 2];
        assert!(matches!(
            decode_response(&bytes),
            Err(EnvelopeDecodeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn value_navigate_nested_path() {
        let mut inner = BTreeMap::new();
        inner.insert("enabled".to_string(), Value::Bool(true));
        let mut outer = BTreeMap::new();
        outer.insert("config".to_string(), Value::Map(inner));
        let root = Value::Map(outer);

        let found = root
            .navigate(&["config".to_string(), "enabled".to_string()])
            .unwrap();
        assert_eq!(found.as_bool(), Some(true));

        assert!(root
            .navigate(&["config".to_string(), "missing".to_string()])
            .is_none());
    }
}
