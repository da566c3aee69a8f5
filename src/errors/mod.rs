// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod record;
mod stream;

pub use config::ConfigError;
pub use record::RecordError;
pub use stream::{StageError, StreamError};
