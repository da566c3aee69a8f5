// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! All diagnostic and operational log events emitted by the stream engine are
//! message structs with a `Display` implementation, so log text is never
//! assembled from loose strings at call sites.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - stream lifecycle and state transitions
//! * `messages::stage` - stage execution events
//!
//! # Usage
//!
//! ```rust
//! use record_stream::observability::messages::engine::StreamFailed;
//! use record_stream::observability::messages::StructuredLog;
//!
//! let error = std::io::Error::new(std::io::ErrorKind::Other, "test error");
//! StreamFailed { processed: 10, discarded: 4, error: &error }.log();
//! ```

pub mod messages;
