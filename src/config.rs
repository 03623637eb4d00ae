//! Configuration for the ECG session controller.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tunables for one measurement session.
///
/// All fields must be greater than zero; `validate` enforces this. The
/// defaults mirror the production wearable: a 3-second on-demand ECG read at
/// 500 Hz, two off-contact batches to abort, two hundred on-contact batches
/// to arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Requested session length in milliseconds
    pub target_duration_ms: u64,
    /// Fixed sensor frequency in Hz
    pub sample_rate_hz: u32,
    /// Consecutive no-contact batches before declaring lost contact
    pub debounce_ticks_off: u32,
    /// Consecutive in-contact batches required before measuring starts
    pub starting_ticks: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_duration_ms: 3000,
            sample_rate_hz: 500,
            debounce_ticks_off: 2,
            starting_ticks: 200,
        }
    }
}

impl SessionConfig {
    /// Number of valid readings that constitute a complete session:
    /// `ceil(target_duration_ms * sample_rate_hz / 1000)`, minimum 1.
    pub fn target_sample_count(&self) -> usize {
        let exact = self.target_duration_ms as u128 * self.sample_rate_hz as u128;
        (((exact + 999) / 1000) as usize).max(1)
    }

    /// Check the all-fields-positive invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_duration_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "target_duration_ms must be > 0".into(),
            ));
        }
        if self.sample_rate_hz == 0 {
            return Err(ConfigError::InvalidValue("sample_rate_hz must be > 0".into()));
        }
        if self.debounce_ticks_off == 0 {
            return Err(ConfigError::InvalidValue(
                "debounce_ticks_off must be > 0".into(),
            ));
        }
        if self.starting_ticks == 0 {
            return Err(ConfigError::InvalidValue("starting_ticks must be > 0".into()));
        }
        Ok(())
    }
}

/// On-disk configuration for the CLI: the session tunables plus where
/// finished sessions and statistics are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Session tunables
    pub session: SessionConfig,
    /// Path for exporting finished session records
    pub export_path: PathBuf,
    /// Path for storing state and statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ecg-session");

        Self {
            session: SessionConfig::default(),
            export_path: data_dir.join("exports"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path; a missing file means
    /// defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.session.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ecg-session")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidValue(e) => write!(f, "Invalid value: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
