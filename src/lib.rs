// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;         // stream options + loading
pub mod engine;         // stream engine, producer, stages
pub mod errors;         // error handling
pub mod observability;
pub mod record;         // record envelope
pub mod traits;         // stage abstractions

pub use config::StreamOptions;
pub use engine::{Input, Producer, Stream, StreamStats, Written};
pub use errors::{RecordError, StageError, StreamError};
pub use record::{Payload, Record, RecordOptions};
