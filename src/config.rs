//! Configuration using Figment
//!
//! Configuration is loaded from (in order of precedence, highest first):
//! 1. Environment variables prefixed with `GRABDAQ_` (nested keys split on `__`)
//! 2. A TOML configuration file (default: `config/grab-daq.toml`)
//! 3. Built-in defaults
//!
//! # Example
//!
//! ```toml
//! [application]
//! name = "Line scan rig"
//! log_level = "debug"
//!
//! [acquisition]
//! retrieve_timeout_ms = 1000
//! triggered_buffer_depth = 30
//! free_run_buffer_depth = 5
//!
//! [devices]
//! default_camera = "acA1920-40gm"
//!
//! [[mock.cameras]]
//! name = "acA1920-40gm"
//! width = 640
//! height = 480
//! frame_interval_ms = 20
//! ```
//!
//! ```text
//! GRABDAQ_APPLICATION__LOG_LEVEL=trace
//! GRABDAQ_ACQUISITION__RETRIEVE_TIMEOUT_MS=250
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::backend::mock::MockCameraConfig;
use crate::backend::BufferPolicy;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Loading or merging the configuration sources failed
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    /// A loaded value is out of range
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrabConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Acquisition loop settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Device selection
    #[serde(default)]
    pub devices: DeviceConfig,
    /// Simulated cameras for the mock backend
    #[serde(default)]
    pub mock: MockConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

/// Acquisition loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Bounded wait per retrieval attempt, in milliseconds
    #[serde(default = "default_retrieve_timeout")]
    pub retrieve_timeout_ms: u64,
    /// Backend buffer count for triggered acquisition
    #[serde(default = "default_triggered_depth")]
    pub triggered_buffer_depth: usize,
    /// Backend buffer count for free-run (latest image only) acquisition
    #[serde(default = "default_free_run_depth")]
    pub free_run_buffer_depth: usize,
    /// Permits seeded at the start of every free-run grab
    #[serde(default = "default_initial_permits")]
    pub initial_permits: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            retrieve_timeout_ms: default_retrieve_timeout(),
            triggered_buffer_depth: default_triggered_depth(),
            free_run_buffer_depth: default_free_run_depth(),
            initial_permits: default_initial_permits(),
        }
    }
}

impl AcquisitionConfig {
    /// Per-attempt retrieval timeout.
    pub fn retrieve_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieve_timeout_ms)
    }

    /// Buffer policy for externally triggered acquisition.
    pub fn triggered_policy(&self) -> BufferPolicy {
        BufferPolicy::OneByOne {
            depth: self.triggered_buffer_depth,
        }
    }

    /// Buffer policy for free-run acquisition.
    pub fn free_run_policy(&self) -> BufferPolicy {
        BufferPolicy::LatestImageOnly {
            depth: self.free_run_buffer_depth,
        }
    }
}

/// Device selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Camera opened when none is named explicitly (first available if unset)
    #[serde(default)]
    pub default_camera: Option<String>,
}

/// Mock backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated cameras, in enumeration order
    #[serde(default)]
    pub cameras: Vec<MockCameraConfig>,
}

fn default_app_name() -> String {
    "grab-daq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_retrieve_timeout() -> u64 {
    1000
}

fn default_triggered_depth() -> usize {
    30
}

fn default_free_run_depth() -> usize {
    5
}

fn default_initial_permits() -> u64 {
    1
}

impl GrabConfig {
    /// Load configuration from `config/grab-daq.toml` and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/grab-daq.toml")
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error: defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file is malformed or validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(GrabConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("GRABDAQ_").split("__"))
            .extract()
            .map_err(|e| ConfigError::LoadError(Box::new(e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Override the log level and validate the result.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Result<Self, ConfigError> {
        self.application.log_level = level.into();
        self.validate()?;
        Ok(self)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Retrieval timeout, buffer depths and initial permits are non-zero
    /// - Mock camera names are unique and non-empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.acquisition.retrieve_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "retrieve_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.acquisition.triggered_buffer_depth == 0
            || self.acquisition.free_run_buffer_depth == 0
        {
            return Err(ConfigError::ValidationError(
                "buffer depths must be > 0".to_string(),
            ));
        }

        if self.acquisition.initial_permits == 0 {
            return Err(ConfigError::ValidationError(
                "initial_permits must be > 0".to_string(),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for camera in &self.mock.cameras {
            if camera.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "mock camera 'name' cannot be empty".to_string(),
                ));
            }
            if !names.insert(&camera.name) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate mock camera name: '{}'",
                    camera.name
                )));
            }
        }

        Ok(())
    }
}
