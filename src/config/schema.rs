//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use super::error::{ConfigError, ConfigResult};
use crate::monitor::PortSettings;
use crate::port::naming::{DEFAULT_DEVICE_DIR, DEFAULT_PATTERN, DEFAULT_PREFIX};
use crate::port::{BaudRate, DeviceNaming};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial line defaults
    pub serial: SerialConfig,
    /// Port discovery rule
    pub discovery: DiscoveryConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Saved settings per port display name
    pub ports: BTreeMap<String, PortSettings>,
}

impl Config {
    /// Check values serde cannot: the baud rate and the discovery pattern.
    pub fn validate(&self) -> ConfigResult<()> {
        BaudRate::new(self.serial.default_baud)
            .map_err(|e| ConfigError::validation("serial.default_baud", e.to_string()))?;
        self.discovery.naming()?;
        Ok(())
    }

    /// Settings for `port`: the saved entry, or defaults at the configured baud rate.
    pub fn port_settings(&self, port: &str) -> PortSettings {
        self.ports.get(port).copied().unwrap_or_else(|| PortSettings {
            baud_rate: BaudRate::new(self.serial.default_baud).unwrap_or_default(),
            ..PortSettings::default()
        })
    }

    /// Remember `settings` for `port`.
    pub fn remember_port(&mut self, port: impl Into<String>, settings: PortSettings) {
        self.ports.insert(port.into(), settings);
    }
}

/// Serial line configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate for ports without saved settings
    pub default_baud: u32,
    /// How long a read waits for the first byte, in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_baud: 19200,
            read_timeout_ms: 1000,
        }
    }
}

impl SerialConfig {
    /// Get the read timeout as Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Port discovery configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Directory holding device nodes
    pub device_dir: PathBuf,
    /// Node-name prefix stripped to form display names
    pub prefix: String,
    /// Regular expression display names must match
    pub pattern: String,
    /// Watch the device directory for hot-plug events
    pub watch: bool,
    /// Poll instead of native notification when set, in milliseconds
    pub poll_interval_ms: Option<u64>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from(DEFAULT_DEVICE_DIR),
            prefix: DEFAULT_PREFIX.to_string(),
            pattern: DEFAULT_PATTERN.to_string(),
            watch: true,
            poll_interval_ms: None,
        }
    }
}

impl DiscoveryConfig {
    /// Build the naming rule described by this section.
    pub fn naming(&self) -> ConfigResult<DeviceNaming> {
        DeviceNaming::new(&self.device_dir, &self.prefix, &self.pattern)
            .map_err(|e| ConfigError::validation("discovery.pattern", e.to_string()))
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log format: "pretty", "compact", "full"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line format with colors
    Pretty,
    /// Single-line format
    #[default]
    Compact,
    /// Default tracing-subscriber format
    Full,
}
