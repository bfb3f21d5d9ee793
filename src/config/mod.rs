/// Configuration management for wita
///
/// Two inputs: the roster file naming groups and servers (see
/// [`roster_file`]), and an optional TOML settings file tuning the daemon.
pub mod roster_file;

pub use roster_file::RosterFile;

use crate::core::Roster;
use crate::error::ConfigError;
use crate::health::ProbeSettings;
use crate::protocol::DEFAULT_BUFFER_CAPACITY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Roster file read when none is given on the command line
pub const DEFAULT_ROSTER_PATH: &str = "/etc/opt/ts/wita.cfg";

/// Smallest usable line buffer
pub const MIN_BUFFER_CAPACITY: usize = 16;

/// Produces a freshly built roster on every call
///
/// Called once at startup and again on every reload request. An error leaves
/// whatever roster is currently installed in place.
pub trait RosterSource {
    fn load(&self) -> Result<Roster, ConfigError>;

    /// Human-readable origin, for logs
    fn describe(&self) -> String {
        "roster".to_string()
    }
}

impl<F> RosterSource for F
where
    F: Fn() -> Result<Roster, ConfigError>,
{
    fn load(&self) -> Result<Roster, ConfigError> {
        self()
    }
}

/// Daemon settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Probe cadence
    pub health: HealthConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Resolver pipe
    pub protocol: ProtocolConfig,
}

/// Health check configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Wait between two probes of the same server, in seconds
    pub interval_sec: u64,
    /// Connect timeout in seconds
    pub connect_timeout_sec: u64,
    /// Timeout for the server's first byte in seconds
    pub read_timeout_sec: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (text, compact)
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Longest accepted command line, newline included
    pub buffer_capacity: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_sec: 5,
            connect_timeout_sec: 5,
            read_timeout_sec: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl Settings {
    /// Load settings from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let settings: Settings = toml::from_str(&content)
            .map_err(|e| ConfigError::TomlError(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health.interval_sec == 0 {
            return Err(ConfigError::ValidationError(
                "health check interval_sec must be greater than 0".to_string(),
            ));
        }

        if self.health.connect_timeout_sec == 0 {
            return Err(ConfigError::ValidationError(
                "health check connect_timeout_sec must be greater than 0".to_string(),
            ));
        }

        if self.health.read_timeout_sec == 0 {
            return Err(ConfigError::ValidationError(
                "health check read_timeout_sec must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => return Err(ConfigError::ValidationError(
                format!("Invalid log level: {}", self.logging.level)
            )),
        }

        match self.logging.format.as_str() {
            "text" | "compact" => {}
            _ => return Err(ConfigError::ValidationError(
                format!("Invalid log format: {}", self.logging.format)
            )),
        }

        if self.protocol.buffer_capacity < MIN_BUFFER_CAPACITY {
            return Err(ConfigError::ValidationError(format!(
                "protocol buffer_capacity must be at least {}",
                MIN_BUFFER_CAPACITY
            )));
        }

        Ok(())
    }

    /// Probe cadence derived from the health section
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            interval: Duration::from_secs(self.health.interval_sec),
            connect_timeout: Duration::from_secs(self.health.connect_timeout_sec),
            read_timeout: Duration::from_secs(self.health.read_timeout_sec),
        }
    }

    /// Create example settings file
    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        Settings::default().save_to_file(path)
    }
}
