// src/config.rs - Application configuration loaded from JSON
use crate::error::ConfigError;
use crate::setup_detector::SetupDetectorConfig;
use crate::setup_tracker::SetupTrackerConfig;
use crate::smoothing::SmoothingConfig;
use crate::targets::TargetConfig;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub num_players: usize,
    pub smoothing: SmoothingConfig,
    pub detector: SetupDetectorConfig,
    pub tracker: SetupTrackerConfig,
    pub targets: TargetConfig,
    /// Where session exports go; see [`default_output_dir`] when unset.
    pub output_directory: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            num_players: 1,
            smoothing: SmoothingConfig::default(),
            detector: SetupDetectorConfig::default(),
            tracker: SetupTrackerConfig::default(),
            targets: TargetConfig::default(),
            output_directory: None,
        }
    }
}

impl AppConfig {
    /// Reads a config file. Fields missing from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_directory
            .clone()
            .unwrap_or_else(default_output_dir)
    }
}

/// `~/Documents/PoseSetup` when a documents directory exists, else `./output`.
pub fn default_output_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(|docs| docs.join("PoseSetup")))
        .unwrap_or_else(|| PathBuf::from("./output"))
}
