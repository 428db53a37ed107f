//! Serial Ports Library
//!
//! Discovers serial ports, opens them exclusively in raw mode, and puts the
//! terminal back the way it was found when the connection is closed.
//!
//! # Modules
//!
//! - `port`: Naming rule, backend traits, POSIX and mock backends
//! - `registry`: Port discovery and change notification
//! - `session`: Exclusive open, raw configuration, restore on close
//! - `monitor`: Connection lifecycle for an interactive serial monitor
//! - `config`: Configuration management with TOML support
//! - `error`: Application error type for the CLI
//! - `logging`: Tracing subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use serial_ports::{PortRegistry, PortSession};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(PortRegistry::default());
//! for port in registry.list_ports() {
//!     println!("{} -> {}", port.name, port.path.display());
//! }
//!
//! let session = PortSession::posix(Arc::clone(&registry));
//! let mut handle = session.open("ttyUSB0", 9600)?;
//! handle.write_all(b"hello\n")?;
//! handle.close()?;
//! # Ok::<(), serial_ports::PortError>(())
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod port;
pub mod registry;
pub mod session;

// Re-export commonly used types for convenience
pub use error::{AppError, AppResult};
pub use monitor::{PortSettings, SerialMonitor};
pub use port::{
    BaudRate, DeviceNaming, MockBackend, PortError, ReadOutcome, SerialBackend,
    TerminalAttributes, TerminalDevice, STANDARD_BAUD_RATES,
};
pub use registry::{Port, PortDetails, PortRegistry, PortsChanged, UsbDetails};
pub use session::{HandleState, PortHandle, PortSession};

#[cfg(unix)]
pub use port::PosixBackend;

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
