// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for stage execution events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A stage function returned an error.
///
/// # Log Level
/// `error!` - Failure requiring attention
///
/// # Example
/// ```
/// use record_stream::observability::messages::stage::StageFailed;
///
/// let error = std::io::Error::new(std::io::ErrorKind::Other, "boom");
/// let msg = StageFailed {
///     stage_index: 1,
///     stage_name: "map",
///     record_key: "abc",
///     error: &error,
/// };
///
/// assert_eq!(msg.to_string(), "Stage 1 ('map') failed on record 'abc': boom");
/// ```
pub struct StageFailed<'a> {
    pub stage_index: usize,
    pub stage_name: &'a str,
    pub record_key: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for StageFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage {} ('{}') failed on record '{}': {}",
            self.stage_index, self.stage_name, self.record_key, self.error
        )
    }
}

impl StructuredLog for StageFailed<'_> {
    fn log(&self) {
        tracing::error!(
            stage_index = self.stage_index,
            stage_name = self.stage_name,
            record_key = self.record_key,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "stage_failed",
            span_name = name,
            stage_index = self.stage_index,
            stage_name = self.stage_name,
        )
    }
}

/// A filter stage rejected a record.
///
/// # Log Level
/// `trace!` - Per-record detail
pub struct RecordFiltered<'a> {
    pub stage_index: usize,
    pub record_key: &'a str,
}

impl Display for RecordFiltered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Record '{}' dropped by filter at stage {}",
            self.record_key, self.stage_index
        )
    }
}

impl StructuredLog for RecordFiltered<'_> {
    fn log(&self) {
        tracing::trace!(
            stage_index = self.stage_index,
            record_key = self.record_key,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!("record_filtered", span_name = name, record_key = self.record_key)
    }
}

/// An error value written by the producer reached a worker.
///
/// # Log Level
/// `warn!` - Potential issue or degraded behavior
pub struct PoisonDispatched<'a> {
    pub error: &'a dyn std::error::Error,
}

impl Display for PoisonDispatched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Producer error dispatched into the stream: {}", self.error)
    }
}

impl StructuredLog for PoisonDispatched<'_> {
    fn log(&self) {
        tracing::warn!(error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("poison_dispatched", span_name = name, error = %self.error)
    }
}

/// Per-record execution span.
///
/// # Log Level
/// `trace!` - Per-record detail
pub struct RecordDispatched<'a> {
    pub record_key: &'a str,
    pub payload_kind: &'a str,
    pub stage_count: usize,
}

impl Display for RecordDispatched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Record '{}' ({}) dispatched through {} stages",
            self.record_key, self.payload_kind, self.stage_count
        )
    }
}

impl StructuredLog for RecordDispatched<'_> {
    fn log(&self) {
        tracing::trace!(
            record_key = self.record_key,
            payload_kind = self.payload_kind,
            stage_count = self.stage_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::trace_span!(
            "record",
            span_name = name,
            record_key = self.record_key,
            stage_count = self.stage_count,
        )
    }
}

/// A stage panicked while processing a record.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct StagePanicked<'a> {
    pub record_key: &'a str,
    pub message: &'a str,
}

impl Display for StagePanicked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Stage panicked on record '{}': {}", self.record_key, self.message)
    }
}

impl StructuredLog for StagePanicked<'_> {
    fn log(&self) {
        tracing::error!(record_key = self.record_key, panic = self.message, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("stage_panicked", span_name = name, record_key = self.record_key)
    }
}
