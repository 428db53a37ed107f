//! Port-specific error types.
//!
//! Defines error types for serial port operations, separate from application-level
//! errors to maintain clean separation of concerns.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The name does not resolve to a device node that exists right now.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// Another process (or handle) holds the exclusive lock on the device.
    #[error("Serial port is busy: {}", .0.display())]
    Busy(PathBuf),

    /// The OS refused access to the device node.
    #[error("Permission denied opening {}", .0.display())]
    PermissionDenied(PathBuf),

    /// Any other OS-level failure during open, configure, read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The handle has already been closed.
    #[error("Port is closed")]
    Closed,

    /// The requested line speed is not one of the standard rates.
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Classify an error returned by `open(2)` on `path`.
    pub fn from_open_error(path: &Path, err: io::Error) -> Self {
        match err.raw_os_error() {
            #[cfg(unix)]
            Some(libc::EBUSY) | Some(libc::EWOULDBLOCK) => Self::Busy(path.to_path_buf()),
            #[cfg(unix)]
            Some(libc::EACCES) | Some(libc::EPERM) => Self::PermissionDenied(path.to_path_buf()),
            #[cfg(unix)]
            Some(libc::ENOENT) | Some(libc::ENXIO) | Some(libc::ENODEV) => {
                Self::NotFound(path.display().to_string())
            }
            _ => match err.kind() {
                io::ErrorKind::NotFound => Self::NotFound(path.display().to_string()),
                io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
                _ => Self::Io(err),
            },
        }
    }

    /// True for the conditions a read treats as "the device went away".
    pub fn is_device_lost(err: &io::Error) -> bool {
        #[cfg(unix)]
        let lost_errno = err
            .raw_os_error()
            .map(|code| matches!(code, libc::EIO | libc::ENXIO | libc::ENODEV | libc::EPIPE));
        #[cfg(not(unix))]
        let lost_errno: Option<bool> = None;

        lost_errno.unwrap_or_else(|| {
            matches!(
                err.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::NotConnected
            )
        })
    }
}
