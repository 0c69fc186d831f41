//! Wire codec for the newline-delimited JSON-RPC dialect the backends speak.
//!
//! Three frame shapes travel on the wire:
//!
//! - Request: `{"id": n, "method": "...", "params": [...]}`
//! - Response: `{"id": n, "result": ...}` or `{"id": n, "error": ...}`
//! - Notification: `{"method": "...", "params": [...]}` with no `id`
//!
//! The shape discriminator is the presence of `id`: with it the frame must
//! carry `result` or `error`, without it the frame must carry `method`.
//! Anything else fails with [`WireError::MalformedFrame`].

use serde::Serialize;
use serde_json::Value;

use crate::error::WireError;

/// An outbound request frame. Ids are assigned by the transport worker,
/// monotonically increasing per connection run.
#[derive(Debug, Clone, Serialize)]
pub struct RawRequest {
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

impl RawRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Serialize to a single newline-terminated frame.
    pub fn to_frame(&self) -> String {
        let mut frame = serde_json::to_string(self).expect("request serialization is infallible");
        frame.push('\n');
        frame
    }
}

/// A response frame matched to a request by id.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub id: u64,
    pub result: Result<Value, Value>,
}

/// A server-initiated notification frame.
#[derive(Debug, Clone)]
pub struct RawNotification {
    pub method: String,
    pub params: Vec<Value>,
}

impl RawNotification {
    /// The first parameter as a string, if present. Subscription routing
    /// keys on it (e.g. the address of an address-status notification).
    pub fn key_param(&self) -> Option<&str> {
        self.params.first().and_then(Value::as_str)
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone)]
pub enum Incoming {
    Response(RawResponse),
    Notification(RawNotification),
}

/// Classify one inbound line.
pub fn parse_incoming(line: &str) -> Result<Incoming, WireError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| WireError::MalformedFrame(format!("unparsable JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| WireError::MalformedFrame(format!("frame is not an object: {value}")))?;

    if let Some(id) = object.get("id") {
        let id = id
            .as_u64()
            .ok_or_else(|| WireError::MalformedFrame(format!("non-integer id: {id}")))?;
        if let Some(error) = object.get("error") {
            // An explicit null error means success per the servers in the wild.
            if !error.is_null() {
                return Ok(Incoming::Response(RawResponse {
                    id,
                    result: Err(error.clone()),
                }));
            }
        }
        let result = object
            .get("result")
            .cloned()
            .ok_or_else(|| WireError::MalformedFrame(format!("response without result: {value}")))?;
        return Ok(Incoming::Response(RawResponse {
            id,
            result: Ok(result),
        }));
    }

    let method = object
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| WireError::MalformedFrame(format!("frame without id or method: {value}")))?;
    let params = match object.get("params") {
        Some(Value::Array(params)) => params.clone(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    };
    Ok(Incoming::Notification(RawNotification {
        method: method.to_string(),
        params,
    }))
}
