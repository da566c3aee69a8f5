// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! * `engine` - stream lifecycle (created, ready, paused, drained, failed, destroyed)
//! * `stage` - stage failures, filtered records and poison entries
//!
//! # Usage Pattern
//!
//! ```rust
//! use record_stream::observability::messages::engine::StreamReady;
//!
//! let msg = StreamReady {
//!     concurrency: 4,
//!     stage_count: 2,
//!     queued: 10,
//! };
//!
//! tracing::info!("{}", msg);
//! ```

use tracing::Span;

pub mod engine;
pub mod stage;

/// A message that knows its own log level and structured fields.
pub trait StructuredLog {
    /// Emit the message as a `tracing` event with structured fields.
    fn log(&self);

    /// Build a span carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}
