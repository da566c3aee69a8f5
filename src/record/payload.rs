// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::{Map, Value};
use std::borrow::Cow;

use crate::errors::RecordError;

/// The data carried by a [`Record`](super::Record).
///
/// A payload is always a single value: text, raw bytes or a key/value map.
/// Sequences are never a payload; a sequence of records is a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
    Map(Map<String, Value>),
}

impl Payload {
    /// Payload as text: text is returned as-is, bytes are decoded as UTF-8
    /// (lossily), maps are JSON-encoded.
    pub fn as_string(&self) -> Cow<'_, str> {
        match self {
            Payload::Text(text) => Cow::Borrowed(text.as_str()),
            Payload::Bytes(bytes) => String::from_utf8_lossy(bytes),
            Payload::Map(map) => Cow::Owned(encode_map(map)),
        }
    }

    /// Payload as bytes: bytes are returned as-is, maps are JSON-encoded and
    /// text is UTF-8 encoded.
    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Payload::Bytes(bytes) => Cow::Borrowed(bytes.as_slice()),
            Payload::Text(text) => Cow::Borrowed(text.as_bytes()),
            Payload::Map(map) => Cow::Owned(encode_map(map).into_bytes()),
        }
    }

    /// Payload as structured data.
    ///
    /// Maps are returned unchanged. Text, and bytes holding UTF-8 text, are
    /// parsed; the call fails only when that textual form is not valid JSON.
    pub fn as_json(&self) -> Result<Value, RecordError> {
        match self {
            Payload::Map(map) => Ok(Value::Object(map.clone())),
            Payload::Text(text) => parse(text),
            Payload::Bytes(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|e| RecordError::NotParsable {
                    reason: format!("payload bytes are not UTF-8: {}", e),
                })?;
                parse(text)
            }
        }
    }

    /// Byte length of the payload in its natural encoding.
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Bytes(bytes) => bytes.len(),
            Payload::Map(map) => encode_map(map).len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Text(text) => text.is_empty(),
            Payload::Bytes(bytes) => bytes.is_empty(),
            Payload::Map(map) => map.is_empty(),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Bytes(_) => "bytes",
            Payload::Map(_) => "map",
        }
    }
}

fn encode_map(map: &Map<String, Value>) -> String {
    // Display for Value is infallible, unlike serde_json::to_string.
    Value::Object(map.clone()).to_string()
}

fn parse(text: &str) -> Result<Value, RecordError> {
    serde_json::from_str(text).map_err(|e| RecordError::NotParsable {
        reason: e.to_string(),
    })
}

impl TryFrom<Value> for Payload {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Payload::Map(map)),
            Value::String(text) => Ok(Payload::Text(text)),
            Value::Null => Err(RecordError::InvalidPayloadKind { kind: "null" }),
            Value::Array(_) => Err(RecordError::InvalidPayloadKind { kind: "array" }),
            Value::Number(_) => Err(RecordError::InvalidPayloadKind { kind: "number" }),
            Value::Bool(_) => Err(RecordError::InvalidPayloadKind { kind: "bool" }),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Payload::Map(map)
    }
}
