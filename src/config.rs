//! TOML configuration for metric runs.
//!
//! Config keys (TOML): `dice`, `loss`, `report`. Missing files and missing
//! sections fall back to defaults; present values are validated on load so a
//! malformed `ignore_indices` never reaches a metric.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ml::MetricError;
use crate::ml::loss::SoftDiceLoss;
use crate::ml::metrics::{DiceCoefficient, DiceOptions};

mod io;

pub use io::{config_path, load_from, load_or_default, save_to_path};

/// Default filename used to store the configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Settings loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub dice: DiceOptions,
    #[serde(default)]
    pub loss: SoftDiceLoss,
    #[serde(default)]
    pub report: ReportSettings,
}

/// Controls what the evaluation tool prints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSettings {
    /// Number of off-diagonal confusions to list.
    #[serde(default = "default_top_confusions")]
    pub top_confusions: usize,
    /// Emit the Dice result as JSON instead of a table.
    #[serde(default)]
    pub json: bool,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            top_confusions: default_top_confusions(),
            json: false,
        }
    }
}

fn default_top_confusions() -> usize {
    10
}

impl MetricsConfig {
    /// Check that every section describes a constructible metric.
    pub fn validate(&self) -> Result<(), MetricError> {
        DiceCoefficient::new(self.dice.clone())?;
        if !self.loss.smooth.is_finite() || self.loss.smooth <= 0.0 {
            return Err(MetricError::Config(format!(
                "loss.smooth must be finite and > 0, got {}",
                self.loss.smooth
            )));
        }
        Ok(())
    }
}

/// Errors that may occur while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to create the config directory.
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        /// Directory path that failed to create.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to read a config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to write a config file.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Path that failed to write.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to serialize config to TOML.
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML serialization error.
        source: toml::ser::Error,
    },
    /// Parsed values describe an unusable metric.
    #[error("Invalid settings in {path}: {source}")]
    Invalid {
        /// TOML file path.
        path: PathBuf,
        /// Validation failure.
        source: MetricError,
    },
    /// No usable config directory found.
    #[error("No suitable config directory found")]
    NoConfigDir,
}
