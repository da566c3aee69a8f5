// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The record envelope that flows through a stream.
//!
//! A [`Record`] wraps a [`Payload`] with an identifying key and provenance
//! timestamps. The key and timestamps are fixed at construction; only the
//! payload may be replaced, typically by a `map` stage.
//!
//! ```rust
//! use record_stream::record::{Record, RecordOptions};
//! use serde_json::json;
//!
//! let record = Record::from_value(json!({"index": 7}), RecordOptions::default()).unwrap();
//! let bytes = record.as_bytes().into_owned();
//!
//! let decoded = Record::new(bytes, RecordOptions::default());
//! assert_eq!(decoded.as_json().unwrap(), json!({"index": 7}));
//! ```

mod payload;

pub use payload::Payload;

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::borrow::Cow;
use uuid::Uuid;

use crate::errors::RecordError;

/// Caller-supplied provenance for a new record.
///
/// * `key` - unique key; a v4 UUID is generated when absent
/// * `ingest_time` - when the data was ingested, if the source knows it
/// * `process_time` - when the data entered the stream; defaults to now
/// * `event_time` - time of the event the data describes
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    pub key: Option<String>,
    pub ingest_time: Option<DateTime<Utc>>,
    pub process_time: Option<DateTime<Utc>>,
    pub event_time: Option<DateTime<Utc>>,
}

impl RecordOptions {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }
}

/// A single unit of data in a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    key: String,
    ingest_time: Option<DateTime<Utc>>,
    process_time: DateTime<Utc>,
    event_time: Option<DateTime<Utc>>,
    /// The payload, replaceable by stages.
    pub data: Payload,
}

impl Record {
    pub fn new(data: impl Into<Payload>, options: RecordOptions) -> Self {
        Self {
            key: options.key.unwrap_or_else(|| Uuid::new_v4().to_string()),
            ingest_time: options.ingest_time,
            process_time: options.process_time.unwrap_or_else(Utc::now),
            event_time: options.event_time,
            data: data.into(),
        }
    }

    /// Builds a record from an untyped JSON value.
    ///
    /// Fails with [`RecordError::InvalidPayloadKind`] for `null`, arrays and
    /// scalars other than strings.
    pub fn from_value(value: Value, options: RecordOptions) -> Result<Self, RecordError> {
        let data = Payload::try_from(value)?;
        Ok(Self::new(data, options))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ingest_time(&self) -> Option<DateTime<Utc>> {
        self.ingest_time
    }

    pub fn process_time(&self) -> DateTime<Utc> {
        self.process_time
    }

    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        self.event_time
    }

    pub fn as_string(&self) -> Cow<'_, str> {
        self.data.as_string()
    }

    pub fn as_json(&self) -> Result<Value, RecordError> {
        self.data.as_json()
    }

    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        self.data.as_bytes()
    }

    /// Returns the record with its payload replaced, keeping key and timestamps.
    pub fn with_data(mut self, data: impl Into<Payload>) -> Self {
        self.data = data.into();
        self
    }
}
