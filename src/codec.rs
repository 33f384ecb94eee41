//! CBOR codec between transport payloads and typed messages.
//!
//! Decoding is driven by the registry: the endpoint's schema picks which
//! request variant is constructed. An empty payload is a valid null message
//! (GET and DELETE frequently carry none); unknown map keys are rejected as
//! malformed. Encoding writes struct fields in declaration order, which is
//! stable across releases and sufficient for interop.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{DotsError, Result};
use crate::messages::{
    Code, ConfigurationResponse, HelloRequest, HelloResponse, MitigationRequest,
    MitigationResponse, RequestSchema, ResponseSchema, SignalConfigRequest,
};

/// Decoded request payload, tagged by endpoint schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Hello(HelloRequest),
    Mitigation(MitigationRequest),
    SessionConfig(SignalConfigRequest),
    /// Data-channel bodies are carried as raw CBOR; this server only
    /// acknowledges them.
    Opaque(ciborium::value::Value),
}

/// Response payload variants the server emits.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Hello(HelloResponse),
    Mitigation(MitigationResponse),
    SessionConfig(ConfigurationResponse),
}

impl Body {
    fn schema(&self) -> ResponseSchema {
        match self {
            Body::Hello(_) => ResponseSchema::Hello,
            Body::Mitigation(_) => ResponseSchema::MitigationStatus,
            Body::SessionConfig(_) => ResponseSchema::Configuration,
        }
    }
}

fn from_slice<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    ciborium::de::from_reader(payload)
        .map_err(|e| DotsError::MalformedRequest(format!("CBOR decode: {e}")))
}

fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| DotsError::Internal(format!("CBOR encode: {e}")))?;
    Ok(buf)
}

/// Decode a request payload for the given endpoint. Empty payload yields the
/// null message.
pub fn decode_request(code: Code, payload: &[u8]) -> Result<Option<Request>> {
    if payload.is_empty() {
        return Ok(None);
    }
    let request = match code.entry().schema {
        RequestSchema::Hello => Request::Hello(from_slice(payload)?),
        RequestSchema::Mitigation => Request::Mitigation(from_slice(payload)?),
        RequestSchema::SignalConfig => Request::SessionConfig(from_slice(payload)?),
        RequestSchema::Opaque => Request::Opaque(from_slice(payload)?),
    };
    Ok(Some(request))
}

/// Encode a response body for the given endpoint; `None` becomes an empty
/// payload. A body of the wrong variant for the endpoint is a server bug
/// and is refused here rather than put on the wire.
pub fn encode_body(code: Code, body: Option<&Body>) -> Result<Vec<u8>> {
    let Some(body) = body else {
        return Ok(Vec::new());
    };
    if body.schema() != code.entry().response {
        return Err(DotsError::Internal(format!(
            "{:?} body on the {} endpoint",
            body.schema(),
            code.path()
        )));
    }
    match body {
        Body::Hello(b) => to_vec(b),
        Body::Mitigation(b) => to_vec(b),
        Body::SessionConfig(b) => to_vec(b),
    }
}
