// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors for loading stream options from disk.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading [`StreamOptions`](crate::config::StreamOptions).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read options file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML options: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid TOML options: {0}")]
    Toml(#[from] toml::de::Error),

    /// The file extension is neither YAML nor TOML.
    #[error("unsupported options format for '{}': expected .yaml, .yml or .toml", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("invalid option '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}
