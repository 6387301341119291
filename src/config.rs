//! Persisted application settings

use crate::protocol::{DEVICE_MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
use std::path::{Path, PathBuf};

/// Shortest capture offered by the duration field (s)
pub const MIN_DURATION_SECS: f64 = 0.1;

/// Longest capture offered by the duration field (s)
pub const MAX_DURATION_SECS: f64 = 30.0;

/// Application configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AppConfig {
    /// Requested sample rate (Hz)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Capture duration (s)
    #[serde(default = "default_duration_secs")]
    pub duration_secs: f64,
    /// Where "Save WAV" writes files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Port selected at the last successful connection
    #[serde(default)]
    pub last_port: Option<String>,
}

fn default_sample_rate() -> u32 {
    DEVICE_MAX_SAMPLE_RATE
}

fn default_duration_secs() -> f64 {
    2.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            duration_secs: default_duration_secs(),
            output_dir: default_output_dir(),
            last_port: None,
        }
    }
}

impl AppConfig {
    /// Config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("xiao-recorder")
            .join("config.json")
    }

    /// Load config from disk, or return defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Save config to disk
    pub fn save(&self) {
        self.save_to(&Self::config_path());
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => {
                        tracing::info!("Config loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => tracing::warn!("Invalid config, using defaults: {}", e),
                },
                Err(e) => tracing::warn!("Cannot read config: {}", e),
            }
        }
        Self::default()
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::error!("Config save error: {}", e);
                } else {
                    tracing::info!("Config saved to {}", path.display());
                }
            }
            Err(e) => tracing::error!("Config serialization error: {}", e),
        }
    }
}

/// Keeps a requested rate within what the board supports
pub fn clamp_sample_rate(sample_rate: u32) -> u32 {
    sample_rate.clamp(MIN_SAMPLE_RATE, DEVICE_MAX_SAMPLE_RATE)
}

/// A usable capture duration, or the value the field should be reset to.
///
/// Non-finite or non-positive durations are rejected; the replacement is the
/// field minimum.
pub fn validate_duration(duration_secs: f64) -> Result<f64, f64> {
    if duration_secs.is_finite() && duration_secs > 0.0 {
        Ok(duration_secs)
    } else {
        let fallback = if duration_secs.is_finite() { duration_secs } else { 0.0 };
        Err(fallback.max(MIN_DURATION_SECS))
    }
}
