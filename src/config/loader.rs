//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "SERIAL_PORTS";

/// Config file name
const CONFIG_FILE_NAME: &str = "serial-ports.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_PORTS_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIAL_PORTS_CONFIG` environment variable (explicit path)
    /// 2. `./serial-ports.toml` (current directory)
    /// 3. the platform config directory (`~/.config/serial-ports/` on Linux)
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        // Saving without an explicit file goes to the platform location.
        let config_path = config_path.or_else(get_default_config_path);
        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        if apply_env_overrides(&mut config).is_err() || config.validate().is_err() {
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a mutable reference to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to file.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired("No config file path set".to_string()))?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set and exists).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            if path.exists() {
                self.config = load_from_file(path)?;
                apply_env_overrides(&mut self.config)?;
                self.config.validate()?;
            }
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    // 4. No config file found - will use defaults
    None
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "serial-ports").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `SERIAL_PORTS_<SECTION>_<KEY>`
/// For example:
/// - `SERIAL_PORTS_SERIAL_DEFAULT_BAUD=9600`
/// - `SERIAL_PORTS_DISCOVERY_DEVICE_DIR=/tmp/fake-dev`
/// - `SERIAL_PORTS_LOGGING_LEVEL=debug`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Serial overrides
    if let Ok(val) = std::env::var(format!("{}_SERIAL_DEFAULT_BAUD", ENV_PREFIX)) {
        config.serial.default_baud = val.parse().map_err(|_| {
            ConfigError::env_parse(
                format!("{}_SERIAL_DEFAULT_BAUD", ENV_PREFIX),
                "Invalid baud rate",
            )
        })?;
    }
    if let Ok(val) = std::env::var(format!("{}_SERIAL_READ_TIMEOUT_MS", ENV_PREFIX)) {
        config.serial.read_timeout_ms = val.parse().map_err(|_| {
            ConfigError::env_parse(
                format!("{}_SERIAL_READ_TIMEOUT_MS", ENV_PREFIX),
                "Invalid timeout",
            )
        })?;
    }

    // Discovery overrides
    if let Ok(val) = std::env::var(format!("{}_DISCOVERY_DEVICE_DIR", ENV_PREFIX)) {
        config.discovery.device_dir = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var(format!("{}_DISCOVERY_PREFIX", ENV_PREFIX)) {
        config.discovery.prefix = val;
    }
    if let Ok(val) = std::env::var(format!("{}_DISCOVERY_PATTERN", ENV_PREFIX)) {
        config.discovery.pattern = val;
    }
    if let Ok(val) = std::env::var(format!("{}_DISCOVERY_WATCH", ENV_PREFIX)) {
        config.discovery.watch = val.to_lowercase() == "true" || val == "1";
    }

    // Logging overrides
    if let Ok(val) = std::env::var(format!("{}_LOGGING_LEVEL", ENV_PREFIX)) {
        config.logging.level = val;
    }

    Ok(())
}
