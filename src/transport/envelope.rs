//! Wire envelope
//!
//! Every message exchanged over the broker is a JSON object
//! `{ "pattern": "<routing key>", "data": <any> }`. `pattern` is required and
//! must be a non-empty string; `data` defaults to `{}`.
//!
//! Decoding is total: anything that is not a well-formed envelope yields
//! `None` instead of an error, so a bad payload never aborts the receive path.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::TransportError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub pattern: String,
    #[serde(default = "empty_data")]
    pub data: Value,
}

impl MessageEnvelope {
    pub fn new(pattern: impl Into<String>, data: Value) -> Self {
        Self {
            pattern: pattern.into(),
            data,
        }
    }
}

fn empty_data() -> Value {
    Value::Object(Map::new())
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    pattern: &'a str,
    data: &'a Value,
}

/// Serialize `{pattern, data}` to JSON bytes.
pub fn encode(pattern: &str, data: &Value) -> Result<Vec<u8>, TransportError> {
    if pattern.is_empty() {
        return Err(TransportError::EmptyPattern);
    }
    Ok(serde_json::to_vec(&EnvelopeRef { pattern, data })?)
}

/// Parse JSON bytes into an envelope, or `None` if they are not one.
pub fn decode(bytes: &[u8]) -> Option<MessageEnvelope> {
    if bytes.is_empty() {
        return None;
    }

    let Value::Object(mut fields) = serde_json::from_slice::<Value>(bytes).ok()? else {
        return None;
    };

    let pattern = match fields.remove("pattern") {
        Some(Value::String(pattern)) if !pattern.is_empty() => pattern,
        _ => return None,
    };
    // An explicit null is treated like a missing field, so handlers always
    // see an object when no payload was sent.
    let data = match fields.remove("data") {
        None | Some(Value::Null) => empty_data(),
        Some(data) => data,
    };

    Some(MessageEnvelope { pattern, data })
}
