//! Configuration for Synheart Activity.

use crate::dataset::LabelSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the three modality trees live
    pub sources: SourceConfig,

    /// Rows per window
    pub window_size: usize,

    /// Rows between consecutive window starts
    pub stride: usize,

    /// Fraction of windows held out for evaluation
    pub test_ratio: f64,

    /// Mini-batch size for both passes
    pub batch_size: usize,

    /// Number of training epochs
    pub epochs: usize,

    /// Adam learning rate
    pub learning_rate: f64,

    /// Gradient norm clipping threshold
    pub grad_clip_norm: f32,

    /// Seed for model init, split and epoch shuffling
    pub seed: u64,

    /// Batches the loader thread may assemble ahead of the trainer
    pub prefetch_batches: usize,

    /// Compute device, chosen once per run
    pub device: DeviceKind,

    /// Directory for JSON run reports
    pub output_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-activity");

        Self {
            sources: SourceConfig::default(),
            window_size: 100,
            stride: 50,
            test_ratio: 0.2,
            batch_size: 64,
            epochs: 20,
            learning_rate: 1e-4,
            grad_clip_norm: 1.0,
            seed: 42,
            prefetch_batches: 4,
            device: DeviceKind::Cpu,
            output_path: data_dir.join("runs"),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("synheart-activity")
            .join("config.json")
    }

    /// Ensure the report directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.output_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject values that would make the pipeline meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 || self.stride == 0 {
            return Err(ConfigError::Invalid(
                "window_size and stride must be positive".to_string(),
            ));
        }
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "test_ratio must be in (0, 1), got {}",
                self.test_ratio
            )));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".to_string()));
        }
        if self.learning_rate <= 0.0 || self.grad_clip_norm <= 0.0 {
            return Err(ConfigError::Invalid(
                "learning_rate and grad_clip_norm must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Root directories of the three mirrored modality trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub device_motion: PathBuf,
    pub accelerometer: PathBuf,
    pub gyroscope: PathBuf,
    /// How the activity label is derived from the activity folder name
    #[serde(default)]
    pub label_source: LabelSource,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            device_motion: PathBuf::from("A_DeviceMotion_data"),
            accelerometer: PathBuf::from("B_Accelerometer_data"),
            gyroscope: PathBuf::from("C_Gyroscope_data"),
            label_source: LabelSource::default(),
        }
    }
}

impl SourceConfig {
    /// Build a source configuration from three roots.
    pub fn new(
        device_motion: impl Into<PathBuf>,
        accelerometer: impl Into<PathBuf>,
        gyroscope: impl Into<PathBuf>,
    ) -> Self {
        Self {
            device_motion: device_motion.into(),
            accelerometer: accelerometer.into(),
            gyroscope: gyroscope.into(),
            label_source: LabelSource::default(),
        }
    }
}

/// Compute device for the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Cpu,
    /// Requires the `wgpu` feature
    Gpu,
}

impl DeviceKind {
    /// Parse a device name as given on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Some(DeviceKind::Cpu),
            "gpu" | "wgpu" | "cuda" => Some(DeviceKind::Gpu),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Gpu => write!(f, "gpu"),
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
