//! Operator configuration, read from TOML.
//!
//! Every section and key is optional; missing values take the built-in
//! defaults. The file is looked up in this order:
//!
//! 1. `--config <path>` (or `FACEGATE_CONFIG`, handled by the argument parser)
//! 2. `./facegate.toml`
//! 3. built-in defaults
//!
//! A file that exists but does not parse or validate is an error; the door
//! controller never starts on a half-understood configuration.
//!
//! ```toml
//! [actuator]
//! address = "/dev/ttyUSB0"
//! baud_rate = 9600
//!
//! [recognition]
//! tolerance = 0.40
//! confirmation_threshold = 3
//!
//! [lock]
//! dwell_ms = 5000
//! write_failure_policy = "optimistic"
//!
//! [storage]
//! database_path = "facegate.db"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use facegate_controller::{ControllerConfig, WriteFailurePolicy};
use facegate_core::constants::{
    AUTO_DETECT_ADDRESS, DEFAULT_ABSENCE_THRESHOLD, DEFAULT_BAUD_RATE,
    DEFAULT_CONFIRMATION_THRESHOLD, DEFAULT_CONTROLLER_QUEUE_CAPACITY, DEFAULT_DWELL_MS,
    DEFAULT_EMBEDDING_DIMENSION, DEFAULT_FRAME_QUEUE_CAPACITY, DEFAULT_MONITOR_INTERVAL_MS,
    DEFAULT_RECONNECT_BACKOFF_MS, DEFAULT_SEND_TIMEOUT_MS, DEFAULT_TOLERANCE,
};
use facegate_hardware::ActuatorConfig;
use facegate_recognition::{AggregatorConfig, EnrollmentConfig, RecognitionConfig};
use facegate_storage::DatabaseConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "facegate.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error ({}): {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

/// Root of `facegate.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacegateConfig {
    pub actuator: ActuatorSection,
    pub recognition: RecognitionSection,
    pub lock: LockSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
}

/// `[actuator]`: the serial link to the relay board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorSection {
    /// Device path, or `"auto"` for the single attached port.
    pub address: String,
    pub baud_rate: u32,
    pub reconnect_backoff_ms: u64,
    pub send_timeout_ms: u64,
    pub monitor_interval_ms: u64,
}

impl Default for ActuatorSection {
    fn default() -> Self {
        Self {
            address: AUTO_DETECT_ADDRESS.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            monitor_interval_ms: DEFAULT_MONITOR_INTERVAL_MS,
        }
    }
}

/// `[recognition]`: matching and debouncing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSection {
    pub tolerance: f32,
    pub confirmation_threshold: u32,
    pub absence_threshold: u32,
    pub frame_queue_capacity: usize,
    pub embedding_dimension: usize,
}

impl Default for RecognitionSection {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            confirmation_threshold: DEFAULT_CONFIRMATION_THRESHOLD,
            absence_threshold: DEFAULT_ABSENCE_THRESHOLD,
            frame_queue_capacity: DEFAULT_FRAME_QUEUE_CAPACITY,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

/// `[lock]`: the lock controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSection {
    pub dwell_ms: u64,
    pub write_failure_policy: WriteFailurePolicy,
    pub queue_capacity: usize,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            dwell_ms: DEFAULT_DWELL_MS,
            write_failure_policy: WriteFailurePolicy::default(),
            queue_capacity: DEFAULT_CONTROLLER_QUEUE_CAPACITY,
        }
    }
}

/// `[storage]`: the SQLite database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub database_path: String,
    pub max_connections: u32,
}

impl Default for StorageSection {
    fn default() -> Self {
        let database = DatabaseConfig::default();
        Self {
            database_path: database.database_path,
            max_connections: database.max_connections,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// `[logging]`. `RUST_LOG` overrides `level` when set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Filter directive, e.g. `info` or `facegate_controller=debug,info`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl FacegateConfig {
    /// Load using the search order in the module docs.
    ///
    /// Returns the configuration and the file it came from, if any.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load_from_file(path)?, Some(path.to_path_buf())));
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            let config = Self::load_from_file(&local)?;
            return Ok((config, Some(local)));
        }

        Ok((Self::default(), None))
    }

    /// Read, parse and validate one file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let actuator = &self.actuator;
        if actuator.address.trim().is_empty() {
            errors.push(format!(
                "actuator.address must not be empty (use \"{AUTO_DETECT_ADDRESS}\" to auto-detect)"
            ));
        }
        if actuator.baud_rate == 0 {
            errors.push("actuator.baud_rate must be > 0".to_string());
        }
        check_nonzero(actuator.reconnect_backoff_ms, "actuator.reconnect_backoff_ms", &mut errors);
        check_nonzero(actuator.send_timeout_ms, "actuator.send_timeout_ms", &mut errors);
        check_nonzero(actuator.monitor_interval_ms, "actuator.monitor_interval_ms", &mut errors);

        let recognition = &self.recognition;
        if !recognition.tolerance.is_finite() || recognition.tolerance <= 0.0 {
            errors.push(format!(
                "recognition.tolerance must be a finite number > 0 (got {})",
                recognition.tolerance
            ));
        }
        if recognition.confirmation_threshold == 0 {
            errors.push("recognition.confirmation_threshold must be > 0".to_string());
        }
        if recognition.absence_threshold == 0 {
            errors.push("recognition.absence_threshold must be > 0".to_string());
        }
        if recognition.frame_queue_capacity == 0 {
            errors.push("recognition.frame_queue_capacity must be >= 1".to_string());
        }
        if recognition.embedding_dimension == 0 {
            errors.push("recognition.embedding_dimension must be > 0".to_string());
        }

        check_nonzero(self.lock.dwell_ms, "lock.dwell_ms", &mut errors);
        if self.lock.queue_capacity == 0 {
            errors.push("lock.queue_capacity must be >= 1".to_string());
        }

        if self.storage.database_path.trim().is_empty() {
            errors.push("storage.database_path must not be empty".to_string());
        }
        if self.storage.max_connections == 0 {
            errors.push("storage.max_connections must be >= 1".to_string());
        }

        if let Err(e) = EnvFilter::try_new(&self.logging.level) {
            errors.push(format!(
                "logging.level '{}' is not a valid filter: {e}",
                self.logging.level
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    pub fn actuator_config(&self) -> ActuatorConfig {
        ActuatorConfig {
            address: self.actuator.address.trim().to_string(),
            baud_rate: self.actuator.baud_rate,
            reconnect_backoff: Duration::from_millis(self.actuator.reconnect_backoff_ms),
            send_timeout: Duration::from_millis(self.actuator.send_timeout_ms),
            monitor_interval: Duration::from_millis(self.actuator.monitor_interval_ms),
        }
    }

    pub fn recognition_config(&self) -> RecognitionConfig {
        RecognitionConfig {
            aggregator: AggregatorConfig {
                tolerance: self.recognition.tolerance,
                confirmation_threshold: self.recognition.confirmation_threshold,
                absence_threshold: self.recognition.absence_threshold,
            },
            frame_queue_capacity: self.recognition.frame_queue_capacity,
        }
    }

    pub fn enrollment_config(&self) -> EnrollmentConfig {
        EnrollmentConfig {
            embedding_dimension: self.recognition.embedding_dimension,
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            dwell: Duration::from_millis(self.lock.dwell_ms),
            write_failure_policy: self.lock.write_failure_policy,
            queue_capacity: self.lock.queue_capacity,
        }
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.storage.database_path.trim())
            .max_connections(self.storage.max_connections)
    }
}

fn check_nonzero(value: u64, name: &str, errors: &mut Vec<String>) {
    if value == 0 {
        errors.push(format!("{name} must be > 0"));
    }
}
