// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The producer side of a stream: turns caller input into records and hands
//! them to the engine, suspending while the engine cannot take more.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::errors::StreamError;
use crate::record::{Payload, Record, RecordOptions};

use super::state::Entry;
use super::stream::Owner;

/// Anything that can be written into a stream.
///
/// A batch must contain records only; any other element fails the whole write
/// with [`StreamError::InvalidBatchInput`].
#[derive(Debug)]
pub enum Input {
    /// An existing record, enqueued as-is (write options are ignored).
    Record(Record),
    Payload(Payload),
    /// Untyped data; objects and strings are accepted, JSON arrays become batches.
    Value(Value),
    Batch(Vec<Input>),
    /// An error that fails the stream once it is dispatched.
    Error(anyhow::Error),
}

impl From<Record> for Input {
    fn from(record: Record) -> Self {
        Input::Record(record)
    }
}

impl From<Vec<Record>> for Input {
    fn from(records: Vec<Record>) -> Self {
        Input::Batch(records.into_iter().map(Input::Record).collect())
    }
}

impl From<Vec<Input>> for Input {
    fn from(items: Vec<Input>) -> Self {
        Input::Batch(items)
    }
}

impl From<Payload> for Input {
    fn from(payload: Payload) -> Self {
        Input::Payload(payload)
    }
}

impl From<String> for Input {
    fn from(text: String) -> Self {
        Input::Payload(Payload::Text(text))
    }
}

impl From<&str> for Input {
    fn from(text: &str) -> Self {
        Input::Payload(Payload::from(text))
    }
}

impl From<Vec<u8>> for Input {
    fn from(bytes: Vec<u8>) -> Self {
        Input::Payload(Payload::Bytes(bytes))
    }
}

impl From<Map<String, Value>> for Input {
    fn from(map: Map<String, Value>) -> Self {
        Input::Payload(Payload::Map(map))
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Input::Batch(items.into_iter().map(Input::Value).collect()),
            other => Input::Value(other),
        }
    }
}

impl From<anyhow::Error> for Input {
    fn from(error: anyhow::Error) -> Self {
        Input::Error(error)
    }
}

/// What a successful write enqueued.
#[derive(Debug, Clone)]
pub enum Written {
    One(Record),
    Batch(Vec<Record>),
    /// An error value was enqueued.
    Error,
}

impl Written {
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Written::One(record) => vec![record],
            Written::Batch(records) => records,
            Written::Error => Vec::new(),
        }
    }

    /// The single record written, if exactly one was.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Written::One(record) => Some(record),
            _ => None,
        }
    }
}

/// Converts caller input into queue entries.
fn prepare(input: Input, options: RecordOptions) -> Result<(Vec<Entry>, Written), StreamError> {
    let record = match input {
        Input::Record(record) => record,
        Input::Payload(payload) => Record::new(payload, options),
        Input::Value(value) => Record::from_value(value, options)?,
        Input::Error(error) => return Ok((vec![Entry::Poison(error)], Written::Error)),
        Input::Batch(items) => {
            let mut records = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Input::Record(record) => records.push(record),
                    _ => return Err(StreamError::InvalidBatchInput { index }),
                }
            }
            let entries = records.iter().cloned().map(Entry::Record).collect();
            return Ok((entries, Written::Batch(records)));
        }
    };
    Ok((vec![Entry::Record(record.clone())], Written::One(record)))
}

/// Cloneable write handle for a stream.
///
/// A producer can live in its own task while the consumer awaits `done()`.
#[derive(Clone)]
pub struct Producer {
    owner: Arc<Owner>,
}

impl Producer {
    pub(crate) fn new(owner: Arc<Owner>) -> Self {
        Self { owner }
    }

    /// Writes `input` into the stream.
    ///
    /// Fails immediately with [`StreamError::StreamClosed`] once `end()` has
    /// been called or the stream is finished. Otherwise the call suspends until
    /// the stream is ready, not paused and below its high-water mark, and fails
    /// with [`StreamError::StreamEnded`] if the stream fails or is destroyed
    /// while waiting.
    pub async fn write(&self, input: impl Into<Input>, options: RecordOptions) -> Result<Written, StreamError> {
        let shared = self.owner.shared();
        let open = shared.lock().accepts_writes();
        if !open {
            return Err(StreamError::StreamClosed);
        }
        let (entries, written) = prepare(input.into(), options)?;
        shared.ensure_workers();
        shared.enqueue(entries).await?;
        Ok(written)
    }

    /// Closes the producer side. Queued records still drain. Idempotent.
    pub fn end(&self) {
        self.owner.shared().end();
    }

    /// True once no further writes will be accepted.
    pub fn is_closed(&self) -> bool {
        !self.owner.shared().lock().accepts_writes()
    }
}
