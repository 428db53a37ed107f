//! Opening, configuring and tearing down serial connections.
//!
//! [`PortSession`] resolves a display name through the [`PortRegistry`], opens
//! the node exclusively, snapshots its terminal attributes and switches it to
//! raw mode. The returned [`PortHandle`] restores the snapshot when closed.
//!
//! ```text
//! name ──> PortRegistry ──> path ──> SerialBackend ──> TerminalDevice
//!                                                        │
//!                               PortHandle { saved attributes, device }
//! ```

use crate::port::{
    BaudRate, PortError, RawModeSettings, ReadOutcome, SerialBackend, TerminalAttributes,
    TerminalDevice,
};
use crate::registry::PortRegistry;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default upper bound a read waits for the first byte.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Size of the buffer used by [`PortHandle::read_available`].
const READ_CHUNK: usize = 1024;

/// Opens ports by display name.
#[derive(Debug, Clone)]
pub struct PortSession {
    registry: Arc<PortRegistry>,
    backend: Arc<dyn SerialBackend>,
    read_timeout: Duration,
}

impl PortSession {
    pub fn new(registry: Arc<PortRegistry>, backend: Arc<dyn SerialBackend>) -> Self {
        Self {
            registry,
            backend,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// A session over real device nodes.
    #[cfg(unix)]
    pub fn posix(registry: Arc<PortRegistry>) -> Self {
        Self::new(registry, Arc::new(crate::port::PosixBackend::new()))
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<PortRegistry> {
        &self.registry
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Open `name` at `baud_rate` in raw mode with an exclusive lock.
    ///
    /// # Errors
    ///
    /// - `PortError::NotFound` if the name does not resolve to an existing node
    /// - `PortError::UnsupportedBaudRate` if the speed is not a standard rate
    /// - `PortError::Busy` if the device is already locked
    /// - `PortError::PermissionDenied` if access is refused
    /// - `PortError::Io` for any other failure while opening or configuring
    pub fn open(&self, name: &str, baud_rate: u32) -> Result<PortHandle, PortError> {
        let path = self.registry.device_path_for_name(name)?;
        let baud_rate = BaudRate::new(baud_rate)?;

        let mut device = self.backend.open_exclusive(&path)?;

        // Snapshot before touching anything so close can undo all of it.
        let saved = match device.attributes() {
            Ok(saved) => saved,
            Err(e) => {
                release_after_failure(device, None, &path);
                return Err(e);
            }
        };

        let settings = RawModeSettings {
            baud_rate,
            read_timeout: self.read_timeout,
        };
        if let Err(e) = device.configure_raw(&settings) {
            release_after_failure(device, Some(&saved), &path);
            return Err(e);
        }

        info!("Opened {} ({}) at {} baud", name, path.display(), baud_rate);
        Ok(PortHandle {
            name: name.to_string(),
            path,
            baud_rate,
            saved_attributes: saved,
            device: Some(device),
        })
    }

    /// Restore and release `handle`. Equivalent to [`PortHandle::close`].
    pub fn close(&self, handle: &mut PortHandle) -> Result<(), PortError> {
        handle.close()
    }
}

fn release_after_failure(
    mut device: Box<dyn TerminalDevice>,
    saved: Option<&TerminalAttributes>,
    path: &Path,
) {
    if let Some(saved) = saved {
        if let Err(e) = device.set_attributes(saved) {
            warn!("Failed to restore {} after open error: {}", path.display(), e);
        }
    }
    if let Err(e) = device.close() {
        warn!("Failed to release {} after open error: {}", path.display(), e);
    }
}

/// Lifecycle state of a [`PortHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Open,
    Closed,
}

/// An exclusively owned open port.
///
/// Call [`close`](Self::close) when done; it restores the terminal attributes
/// captured at open time and releases the lock. A handle dropped while still
/// open performs the same steps, logging instead of returning failures.
#[derive(Debug)]
pub struct PortHandle {
    name: String,
    path: PathBuf,
    baud_rate: BaudRate,
    saved_attributes: TerminalAttributes,
    device: Option<Box<dyn TerminalDevice>>,
}

impl PortHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn baud_rate(&self) -> BaudRate {
        self.baud_rate
    }

    /// Attributes the device had before this session configured it.
    pub fn saved_attributes(&self) -> &TerminalAttributes {
        &self.saved_attributes
    }

    pub fn state(&self) -> HandleState {
        if self.device.is_some() {
            HandleState::Open
        } else {
            HandleState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    fn device_mut(&mut self) -> Result<&mut Box<dyn TerminalDevice>, PortError> {
        self.device.as_mut().ok_or(PortError::Closed)
    }

    /// Read whatever is available into `buffer`.
    ///
    /// Losing the device (unplug) is reported as [`ReadOutcome::DeviceLost`],
    /// not as an error.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<ReadOutcome, PortError> {
        let device = self.device_mut()?;
        match device.read(buffer) {
            Ok(0) if !buffer.is_empty() => {
                // A hung-up tty reads as end-of-file; tell that apart from a timeout.
                if matches!(self.path.try_exists(), Ok(false)) {
                    warn!("{} disappeared", self.path.display());
                    Ok(ReadOutcome::DeviceLost)
                } else {
                    Ok(ReadOutcome::Idle)
                }
            }
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e) if PortError::is_device_lost(&e) => {
                warn!("Read from {} failed, device lost: {}", self.path.display(), e);
                Ok(ReadOutcome::DeviceLost)
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(ReadOutcome::Idle)
            }
            Err(e) => Err(PortError::Io(e)),
        }
    }

    /// Read the currently available bytes; empty on timeout or device loss.
    pub fn read_available(&mut self) -> Result<Vec<u8>, PortError> {
        let mut buffer = vec![0u8; READ_CHUNK];
        let n = self.read(&mut buffer)?.len();
        buffer.truncate(n);
        Ok(buffer)
    }

    /// Write bytes, returning how many the device accepted.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, PortError> {
        Ok(self.device_mut()?.write(data)?)
    }

    pub fn write_all(&mut self, mut data: &[u8]) -> Result<(), PortError> {
        while !data.is_empty() {
            match self.write(data)? {
                0 => {
                    return Err(PortError::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "device accepted no bytes",
                    )))
                }
                n => data = &data[n..],
            }
        }
        Ok(())
    }

    /// Block until written output has been transmitted.
    pub fn drain(&mut self) -> Result<(), PortError> {
        Ok(self.device_mut()?.drain()?)
    }

    /// Restore the saved attributes and release the device.
    ///
    /// The descriptor is released even when restoring fails; the restore
    /// error is then returned. Closing twice yields `PortError::Closed`.
    pub fn close(&mut self) -> Result<(), PortError> {
        let device = self.device.take().ok_or(PortError::Closed)?;
        let result = restore_and_release(device, &self.saved_attributes);
        match &result {
            Ok(()) => info!("Closed {}", self.name),
            Err(e) => warn!("Closed {} with error: {}", self.name, e),
        }
        result
    }
}

fn restore_and_release(
    mut device: Box<dyn TerminalDevice>,
    saved: &TerminalAttributes,
) -> Result<(), PortError> {
    let restored = device.set_attributes(saved);
    let released = device.close();
    restored.and(released)
}

impl Drop for PortHandle {
    fn drop(&mut self) {
        if let Some(device) = self.device.take() {
            debug!("{} dropped while open, releasing", self.name);
            if let Err(e) = restore_and_release(device, &self.saved_attributes) {
                warn!("Releasing {} on drop failed: {}", self.name, e);
            }
        }
    }
}

impl io::Read for PortHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match PortHandle::read(self, buf).map_err(into_io)? {
            ReadOutcome::Data(n) => Ok(n),
            ReadOutcome::DeviceLost => Ok(0),
            ReadOutcome::Idle => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "no data within read timeout",
            )),
        }
    }
}

impl io::Write for PortHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        PortHandle::write(self, buf).map_err(into_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain().map_err(into_io)
    }
}

fn into_io(err: PortError) -> io::Error {
    match err {
        PortError::Io(e) => e,
        PortError::Closed => io::Error::new(io::ErrorKind::NotConnected, err),
        other => io::Error::other(other),
    }
}
