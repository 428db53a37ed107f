//! Core traits for the terminal device seam.
//!
//! `SerialBackend` opens device nodes and `TerminalDevice` is the open
//! descriptor. The real implementation lives in `posix`, the in-memory one in
//! `mock`; the session layer only ever talks to these traits.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Standard line speeds accepted by [`BaudRate::new`].
pub const STANDARD_BAUD_RATES: [u32; 11] = [
    300, 600, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400,
];

/// A line speed drawn from [`STANDARD_BAUD_RATES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BaudRate(u32);

impl BaudRate {
    /// Validate a raw bits-per-second value.
    pub fn new(bps: u32) -> Result<Self, PortError> {
        if STANDARD_BAUD_RATES.contains(&bps) {
            Ok(Self(bps))
        } else {
            Err(PortError::UnsupportedBaudRate(bps))
        }
    }

    pub fn bps(self) -> u32 {
        self.0
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        Self(19200)
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = PortError;

    fn try_from(bps: u32) -> Result<Self, Self::Error> {
        Self::new(bps)
    }
}

impl From<BaudRate> for u32 {
    fn from(rate: BaudRate) -> Self {
        rate.0
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Portable snapshot of a termios record.
///
/// Flag words and speed codes are stored as the platform reports them, so a
/// snapshot can only be meaningfully applied back to the backend that took it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TerminalAttributes {
    pub input_flags: u64,
    pub output_flags: u64,
    pub control_flags: u64,
    pub local_flags: u64,
    pub control_chars: Vec<u8>,
    pub input_speed: u64,
    pub output_speed: u64,
}

/// Line settings applied on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawModeSettings {
    pub baud_rate: BaudRate,
    /// Upper bound a read waits for the first byte; zero means return immediately.
    pub read_timeout: Duration,
}

/// Result of a single read on an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were placed into the buffer.
    Data(usize),
    /// Nothing arrived within the read timeout.
    Idle,
    /// The device disappeared (e.g. USB unplug); no data.
    DeviceLost,
}

impl ReadOutcome {
    /// Number of bytes read, zero for `Idle` and `DeviceLost`.
    pub fn len(self) -> usize {
        match self {
            Self::Data(n) => n,
            Self::Idle | Self::DeviceLost => 0,
        }
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

/// An open, exclusively locked terminal device.
pub trait TerminalDevice: Send + fmt::Debug {
    /// Read the current terminal attributes.
    fn attributes(&self) -> Result<TerminalAttributes, PortError>;

    /// Apply previously captured attributes immediately.
    fn set_attributes(&mut self, attributes: &TerminalAttributes) -> Result<(), PortError>;

    /// Switch the line to raw 8N1 mode at the given speed with flow control,
    /// echo and signal characters disabled.
    fn configure_raw(&mut self, settings: &RawModeSettings) -> Result<(), PortError>;

    /// Read into `buffer`; raw OS errors are reported unclassified.
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize>;

    fn write(&mut self, data: &[u8]) -> std::io::Result<usize>;

    /// Wait until all written output has been transmitted.
    fn drain(&mut self) -> std::io::Result<()>;

    /// Release the descriptor and the exclusive lock.
    fn close(self: Box<Self>) -> Result<(), PortError>;
}

/// Opens device nodes for exclusive use.
pub trait SerialBackend: Send + Sync + fmt::Debug {
    /// Open `path` for reading and writing with an exclusive lock.
    ///
    /// Fails with `Busy`, `PermissionDenied`, `NotFound` or `Io`.
    fn open_exclusive(&self, path: &Path) -> Result<Box<dyn TerminalDevice>, PortError>;
}
