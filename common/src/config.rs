use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Frame endpoint the recorder binary polls for screenshots.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    pub url: String,
    #[serde(default = "default_quality")]
    pub quality: u32,
}

/// Tuning for the screenshot collector itself.
///
/// The similarity thresholds are deliberately configuration, not constants:
/// acceptable false-duplicate / false-distinct rates depend on the visual
/// content being sampled and should be confirmed empirically.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Sampling interval in milliseconds. Must be non-zero.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Maximum retained screenshots; oldest is evicted past this. Must be non-zero.
    #[serde(default = "default_max_screenshots")]
    pub max_screenshots: usize,
    /// Also capture immediately on navigation events, when a navigation
    /// source is attached.
    #[serde(default = "default_capture_on_navigation")]
    pub capture_on_navigation: bool,
    /// A frame is a duplicate only if MSE is below this AND SSIM is above
    /// `ssim_threshold`. MSE is on the 0..255 pixel range.
    #[serde(default = "default_mse_threshold")]
    pub mse_threshold: f64,
    /// See `mse_threshold`. SSIM is in 0..=1, 1 = identical structure.
    #[serde(default = "default_ssim_threshold")]
    pub ssim_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub dir: String,
    #[serde(default = "default_output_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_screenshots: default_max_screenshots(),
            capture_on_navigation: default_capture_on_navigation(),
            mse_threshold: default_mse_threshold(),
            ssim_threshold: default_ssim_threshold(),
        }
    }
}

impl CollectorConfig {
    /// A zero interval or zero capacity produces a non-functional collector;
    /// reject it before one can be constructed.
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_ms == 0 {
            return Err("interval_ms must be greater than zero".into());
        }
        if self.max_screenshots == 0 {
            return Err("max_screenshots must be greater than zero".into());
        }
        Ok(())
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_quality() -> u32 {
    80
}
fn default_interval_ms() -> u64 {
    1000
}
fn default_max_screenshots() -> usize {
    50
}
fn default_capture_on_navigation() -> bool {
    true
}
fn default_mse_threshold() -> f64 {
    100.0
}
fn default_ssim_threshold() -> f64 {
    0.95
}
fn default_output_prefix() -> String {
    "lapse/".into()
}
fn default_log_level() -> String {
    "info".into()
}
