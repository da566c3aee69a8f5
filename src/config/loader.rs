// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{DEFAULT_CONCURRENCY, DEFAULT_HIGH_WATER_MARK};
use crate::errors::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Options for a single stream engine.
///
/// # Fields
/// * `concurrency` - Maximum number of records mid-pipeline at once (defaults to 1).
///   With a value of 1 records are processed strictly in write order.
/// * `high_water_mark` - Undispatched queue length at which `write` suspends
///   (defaults to 16).
///
/// Both values are clamped to a minimum of 1.
///
/// # Example
/// ```yaml
/// concurrency: 4
/// high_water_mark: 64
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    pub concurrency: usize,
    pub high_water_mark: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

impl StreamOptions {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Self::default()
        }
    }

    /// Clamp both limits to at least 1.
    pub fn normalized(self) -> Self {
        Self {
            concurrency: self.concurrency.max(1),
            high_water_mark: self.high_water_mark.max(1),
        }
    }
}

/// Load stream options from a YAML (`.yaml`, `.yml`) or TOML (`.toml`) file.
///
/// Missing fields fall back to their defaults. A zero `concurrency` is
/// rejected rather than silently clamped, since it usually means a typo.
pub fn load_options<P: AsRef<Path>>(path: P) -> Result<StreamOptions, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    let options: StreamOptions = match extension.as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
        Some("toml") => toml::from_str(&content)?,
        _ => {
            return Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };

    if options.concurrency == 0 {
        return Err(ConfigError::Invalid {
            field: "concurrency",
            reason: "must be at least 1".to_string(),
        });
    }

    Ok(options.normalized())
}
