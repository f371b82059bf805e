use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::{predict, Outlook, StallReason};

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read shaft config {path}: {source}")]
    Read {
        /// Offending path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not a valid shaft config document.
    #[error("failed to parse shaft config {path}: {source}")]
    Parse {
        /// Offending path.
        path: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Immutable parameters of one run. Distances share a unit, pause is in seconds.
///
/// Missing keys in a JSON document fall back to [`ShaftConfig::default`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShaftConfig {
    /// Distance the worm must cover to escape.
    pub depth: f64,
    /// Distance gained per attempt.
    pub climb_distance: f64,
    /// Distance lost after every attempt that does not escape.
    pub fall_distance: f64,
    /// Seconds to wait between attempts.
    pub pause_time: f64,
}

impl Default for ShaftConfig {
    fn default() -> Self {
        Self {
            depth: 20.0,
            climb_distance: 5.0,
            fall_distance: 3.0,
            pause_time: 1.0,
        }
    }
}

impl ShaftConfig {
    /// Creates a config from its four parameters.
    #[must_use]
    pub const fn new(depth: f64, climb_distance: f64, fall_distance: f64, pause_time: f64) -> Self {
        Self {
            depth,
            climb_distance,
            fall_distance,
            pause_time,
        }
    }

    /// Depth at which the halfway milestone triggers.
    #[must_use]
    pub fn halfway_mark(&self) -> f64 {
        self.depth / 2.0
    }

    /// Pause between attempts. Negative or non-finite values become zero.
    #[must_use]
    pub fn pause_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.pause_time).unwrap_or(Duration::ZERO)
    }

    /// Reason this configuration never escapes, if any.
    ///
    /// The engine still runs such configurations; hosts should bound them.
    #[must_use]
    pub fn risk(&self) -> Option<StallReason> {
        match predict(self) {
            Outlook::Stalls { reason } => Some(reason),
            Outlook::Escapes { .. } => None,
        }
    }

    /// Parses a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Loads a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
