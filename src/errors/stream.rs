// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors surfaced by the stream engine and its producer side.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::RecordError;

/// A stage failure that halted the stream.
///
/// This is the single fatal error of an engine instance. It is shared behind an
/// `Arc` so the same value can be delivered to every pending `done()` and
/// `to_array()` caller.
#[derive(Debug, Clone)]
pub struct StageError {
    /// Position of the failing stage in the registration order.
    ///
    /// `None` when the failure came from a poison entry written by the producer,
    /// or from a stage panic (then `record_key` is set).
    pub stage: Option<usize>,
    /// Name of the failing stage (`map`, `filter`, `each`, or a custom name).
    pub name: String,
    /// Key of the record being processed, if the failure was tied to one.
    pub record_key: Option<String>,
    pub source: Arc<anyhow::Error>,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(index) => write!(f, "stage {} ('{}') failed: {}", index, self.name, self.source),
            None => match &self.record_key {
                Some(key) => write!(f, "a stage panicked on record '{}': {}", key, self.source),
                None => write!(f, "producer wrote an error into the stream: {}", self.source),
            },
        }
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&**self.source)
    }
}

impl StageError {
    pub fn new(stage: usize, name: impl Into<String>, record_key: &str, source: anyhow::Error) -> Self {
        Self {
            stage: Some(stage),
            name: name.into(),
            record_key: Some(record_key.to_string()),
            source: Arc::new(source),
        }
    }

    /// Failure originating from an error value written by the producer.
    pub fn poisoned(source: anyhow::Error) -> Self {
        Self {
            stage: None,
            name: "write".to_string(),
            record_key: None,
            source: Arc::new(source),
        }
    }

    /// A stage panicked while running the record keyed `record_key`.
    pub fn panicked(record_key: &str, message: &str) -> Self {
        Self {
            stage: None,
            name: "panic".to_string(),
            record_key: Some(record_key.to_string()),
            source: Arc::new(anyhow::anyhow!("{}", message)),
        }
    }

    /// The underlying error raised by the stage function.
    pub fn cause(&self) -> &anyhow::Error {
        &self.source
    }
}

/// Errors returned by [`Stream`](crate::engine::Stream) and
/// [`Producer`](crate::engine::Producer) operations.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// A payload was rejected at record construction.
    #[error(transparent)]
    InvalidPayloadKind(#[from] RecordError),

    /// A batch write contained an element that is not already a record.
    #[error("batch element {index} is not a record")]
    InvalidBatchInput { index: usize },

    /// `write` was called after `end()`, or after the stream ended or failed.
    #[error("stream is closed to further writes")]
    StreamClosed,

    /// The stream ended or failed while a write was waiting for capacity.
    #[error("stream ended while waiting to write")]
    StreamEnded,

    /// The stream was torn down with `destroy()`.
    #[error("stream was destroyed")]
    Destroyed,

    /// A stage failed and the stream halted.
    #[error(transparent)]
    Stage(#[from] StageError),
}

impl StreamError {
    /// Returns the stage failure, if this error is one.
    pub fn as_stage(&self) -> Option<&StageError> {
        match self {
            StreamError::Stage(err) => Some(err),
            _ => None,
        }
    }
}
