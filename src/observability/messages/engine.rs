// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for stream engine lifecycle events.
//!
//! This module contains message types for logging events related to:
//! * Engine construction and the transition to dispatching
//! * Pause and resume of dispatch
//! * Termination: drain, failure and destruction

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Stream engine constructed.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct StreamCreated {
    pub concurrency: usize,
    pub high_water_mark: usize,
    pub seeded: usize,
}

impl Display for StreamCreated {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream created: concurrency={}, high_water_mark={}, seeded={} records",
            self.concurrency, self.high_water_mark, self.seeded
        )
    }
}

impl StructuredLog for StreamCreated {
    fn log(&self) {
        tracing::debug!(
            concurrency = self.concurrency,
            high_water_mark = self.high_water_mark,
            seeded = self.seeded,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "stream",
            span_name = name,
            concurrency = self.concurrency,
            high_water_mark = self.high_water_mark,
        )
    }
}

/// Consumer and stages are both attached; dispatch begins.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use record_stream::observability::messages::engine::StreamReady;
///
/// let msg = StreamReady {
///     concurrency: 1,
///     stage_count: 3,
///     queued: 0,
/// };
///
/// assert_eq!(msg.to_string(), "Stream ready: dispatching with concurrency=1, 3 stages, 0 queued");
/// ```
pub struct StreamReady {
    pub concurrency: usize,
    pub stage_count: usize,
    pub queued: usize,
}

impl Display for StreamReady {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream ready: dispatching with concurrency={}, {} stages, {} queued",
            self.concurrency, self.stage_count, self.queued
        )
    }
}

impl StructuredLog for StreamReady {
    fn log(&self) {
        tracing::info!(
            concurrency = self.concurrency,
            stage_count = self.stage_count,
            queued = self.queued,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "stream_ready",
            span_name = name,
            concurrency = self.concurrency,
            stage_count = self.stage_count,
        )
    }
}

/// Dispatch of new records halted.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct StreamPaused {
    pub running: usize,
    pub pending: usize,
}

impl Display for StreamPaused {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream paused: {} in flight, {} pending",
            self.running, self.pending
        )
    }
}

impl StructuredLog for StreamPaused {
    fn log(&self) {
        tracing::debug!(running = self.running, pending = self.pending, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("stream_paused", span_name = name, pending = self.pending)
    }
}

/// Dispatch resumed after a pause.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct StreamResumed {
    pub pending: usize,
}

impl Display for StreamResumed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Stream resumed: {} pending", self.pending)
    }
}

impl StructuredLog for StreamResumed {
    fn log(&self) {
        tracing::debug!(pending = self.pending, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("stream_resumed", span_name = name, pending = self.pending)
    }
}

/// Producer side closed; the engine drains what is queued.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct EndRequested {
    pub pending: usize,
    pub running: usize,
}

impl Display for EndRequested {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream end requested: draining {} pending, {} in flight",
            self.pending, self.running
        )
    }
}

impl StructuredLog for EndRequested {
    fn log(&self) {
        tracing::debug!(pending = self.pending, running = self.running, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("stream_draining", span_name = name, pending = self.pending)
    }
}

/// Queue drained after end; the stream is finished.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use record_stream::observability::messages::engine::StreamDrained;
/// use std::time::Duration;
///
/// let msg = StreamDrained {
///     processed: 100,
///     written: 100,
///     duration: Duration::from_millis(250),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct StreamDrained {
    pub processed: usize,
    pub written: usize,
    pub duration: Duration,
}

impl Display for StreamDrained {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream ended: processed {} of {} written records in {:?}",
            self.processed, self.written, self.duration
        )
    }
}

impl StructuredLog for StreamDrained {
    fn log(&self) {
        tracing::info!(
            processed = self.processed,
            written = self.written,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "stream_ended",
            span_name = name,
            processed = self.processed,
            duration = ?self.duration,
        )
    }
}

/// A stage failed and the stream halted.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct StreamFailed<'a> {
    pub processed: usize,
    pub discarded: usize,
    pub error: &'a dyn std::error::Error,
}

impl Display for StreamFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream failed after {} records, discarding {} queued: {}",
            self.processed, self.discarded, self.error
        )
    }
}

impl StructuredLog for StreamFailed<'_> {
    fn log(&self) {
        tracing::error!(
            processed = self.processed,
            discarded = self.discarded,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "stream_failed",
            span_name = name,
            processed = self.processed,
            error = %self.error,
        )
    }
}

/// Stream torn down without draining.
///
/// # Log Level
/// `warn!` - Potential issue or degraded behavior
pub struct StreamDestroyed {
    pub discarded: usize,
    pub running: usize,
}

impl Display for StreamDestroyed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream destroyed: discarded {} queued, abandoned {} in flight",
            self.discarded, self.running
        )
    }
}

impl StructuredLog for StreamDestroyed {
    fn log(&self) {
        tracing::warn!(discarded = self.discarded, running = self.running, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("stream_destroyed", span_name = name, discarded = self.discarded)
    }
}

/// Every handle to a live stream was dropped; the engine tears itself down.
///
/// # Log Level
/// `warn!` - Potential issue or degraded behavior
pub struct StreamAbandoned {
    pub discarded: usize,
    pub running: usize,
}

impl Display for StreamAbandoned {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stream abandoned before it finished: discarded {} queued, {} in flight",
            self.discarded, self.running
        )
    }
}

impl StructuredLog for StreamAbandoned {
    fn log(&self) {
        tracing::warn!(discarded = self.discarded, running = self.running, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("stream_abandoned", span_name = name, discarded = self.discarded)
    }
}

/// The stream became ready outside a Tokio runtime. Workers start on the
/// next write or completion awaited inside one.
///
/// # Log Level
/// `debug!` - Diagnostic detail
///
/// # Example
/// ```
/// use record_stream::observability::messages::engine::WorkersDeferred;
///
/// let msg = WorkersDeferred { concurrency: 2 };
/// assert_eq!(msg.to_string(), "No Tokio runtime: deferring start of 2 workers");
/// ```
pub struct WorkersDeferred {
    pub concurrency: usize,
}

impl Display for WorkersDeferred {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "No Tokio runtime: deferring start of {} workers", self.concurrency)
    }
}

impl StructuredLog for WorkersDeferred {
    fn log(&self) {
        tracing::debug!(concurrency = self.concurrency, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("workers_deferred", span_name = name, concurrency = self.concurrency)
    }
}
