//! Configuration module for serial-ports.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_PORTS_CONFIG` environment variable (explicit path)
//! 2. `./serial-ports.toml` (current directory)
//! 3. the platform config directory, e.g. `~/.config/serial-ports/serial-ports.toml`
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `SERIAL_PORTS_<SECTION>_<KEY>`
//!
//! Examples:
//! - `SERIAL_PORTS_SERIAL_DEFAULT_BAUD=9600`
//! - `SERIAL_PORTS_DISCOVERY_DEVICE_DIR=/dev`
//! - `SERIAL_PORTS_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,ignore
//! use serial_ports::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Default baud: {}", config.serial.default_baud);
//! println!("Scanning: {}", config.discovery.device_dir.display());
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, DiscoveryConfig, LogFormat, LoggingConfig, SerialConfig};
