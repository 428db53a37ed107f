//! Tracing subscriber setup for the binary.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{AppError, AppResult};
use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber. `RUST_LOG` takes precedence over `config.level`.
pub fn init(config: &LoggingConfig) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AppError::Logging(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Full => builder.try_init(),
    };
    result.map_err(|e| AppError::Logging(e.to_string()))
}
