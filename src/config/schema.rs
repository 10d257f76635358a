//! Configuration schema definitions.
//!
//! Every section carries serde defaults, so a file only needs the keys it
//! changes.

use super::error::{ConfigError, ConfigResult};
use crate::port::{DEFAULT_BAUD_RATE, DEFAULT_PORT_PREFIX};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port and polling defaults
    pub serial: SerialConfig,
    /// Command-line monitor behaviour
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.default_baud == 0 {
            return Err(ConfigError::invalid(
                "serial.default_baud",
                "baud rate must be greater than zero",
            ));
        }
        if self.serial.port_prefix.is_empty() {
            return Err(ConfigError::invalid(
                "serial.port_prefix",
                "prefix cannot be empty",
            ));
        }
        if let Some((alias, _)) = self
            .serial
            .port_aliases
            .iter()
            .find(|(_, target)| target.is_empty())
        {
            return Err(ConfigError::invalid(
                format!("serial.port_aliases.{alias}"),
                "alias must name a port",
            ));
        }
        if matches!(self.monitor.port.as_deref(), Some("")) {
            return Err(ConfigError::invalid(
                "monitor.port",
                "port name cannot be empty",
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid("logging.level", "level cannot be empty"));
        }
        Ok(())
    }
}

/// Serial port configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate used when a request does not give one
    pub default_baud: u32,
    /// Delay between polls; 0 polls once per tick
    pub poll_interval_ms: u64,
    /// Length of one scheduler tick
    pub tick_interval_ms: u64,
    /// Remove `\r` and `\n` from delivered chunks
    pub strip_terminators: bool,
    /// Prefix of numbered port names, e.g. "COM" or "/dev/ttyUSB"
    pub port_prefix: String,
    /// Port aliases for convenience
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_baud: DEFAULT_BAUD_RATE,
            poll_interval_ms: 0,
            tick_interval_ms: 16,
            strip_terminators: true,
            port_prefix: DEFAULT_PORT_PREFIX.to_string(),
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

/// Monitor configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Fall back to the highest-numbered port when none is named
    pub use_highest_port: bool,
    /// Port to monitor when none is given on the command line
    pub port: Option<String>,
    /// Prefix each chunk with the local wall-clock time
    pub show_timestamps: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            use_highest_port: true,
            port: None,
            show_timestamps: true,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset, e.g. "info" or "serial_port_reader=debug"
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    /// Multi-line with colors
    #[default]
    Pretty,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(ConfigError::invalid(
                "logging.format",
                format!("unknown format '{other}', expected json, pretty or compact"),
            )),
        }
    }
}
