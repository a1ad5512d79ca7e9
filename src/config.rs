// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which compute backend runs the kernels
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// GPU when a device can be created, CPU otherwise
    #[default]
    Auto,
    /// GPU only; fail if no device is available
    Gpu,
    /// Host threads only
    Cpu,
}

impl BackendPreference {
    pub const ALL: [BackendPreference; 3] = [Self::Auto, Self::Gpu, Self::Cpu];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Gpu => "gpu",
            Self::Cpu => "cpu",
        }
    }
}

impl std::fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for BackendPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preference| preference.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown backend `{}` (expected auto, gpu or cpu)", s))
    }
}

/// GPU adapter power preference
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    /// Prefer a discrete GPU
    #[default]
    HighPerformance,
    /// Prefer an integrated GPU
    LowPower,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compute backend (auto, gpu, cpu)
    pub backend: BackendPreference,
    /// Adapter power preference for the GPU backend
    pub power_preference: PowerPreference,
    /// Adapter index from `histeq devices`; overrides the power preference
    pub device_index: Option<usize>,
    /// Equalize the three color channels in parallel
    pub concurrent_channels: bool,
    /// Print per-stage timings after each run
    pub report_timings: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            power_preference: PowerPreference::HighPerformance,
            device_index: None,
            concurrent_channels: true,
            report_timings: false,
        }
    }
}

impl Config {
    /// Default config file location, if the platform has a config directory
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load the user's config, falling back to defaults.
    ///
    /// A missing file is not an error; an unreadable or malformed one is
    /// logged and ignored.
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            debug!("No config directory, using defaults");
            return Self::default();
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring config file");
                Self::default()
            }
        }
    }

    /// Read a config file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write this config as pretty-printed JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }
}
