//! Mock terminal backend for testing.
//!
//! Provides a `MockBackend` that simulates device nodes without requiring
//! actual hardware. Every attribute write is recorded so tests can check that
//! a session leaves the line exactly as it found it.

use super::error::PortError;
use super::traits::{RawModeSettings, SerialBackend, TerminalAttributes, TerminalDevice};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Simulated state of one device node.
#[derive(Debug, Default)]
struct MockDeviceState {
    /// Attributes currently "on the line".
    attributes: TerminalAttributes,
    /// Every attribute set applied through a device, in order.
    attribute_writes: Vec<TerminalAttributes>,
    /// Raw-mode requests, in order.
    raw_configs: Vec<RawModeSettings>,
    /// Bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all bytes written to the device.
    write_log: Vec<Vec<u8>>,
    /// Held by an open device.
    locked: bool,
    /// The node vanished (unplugged).
    removed: bool,
    /// Opening fails with `PermissionDenied`.
    access_denied: bool,
    /// The next `configure_raw` fails.
    fail_configure: bool,
}

/// Mock backend implementation for testing.
///
/// This implementation allows you to:
/// - Register simulated devices with initial terminal attributes
/// - Enqueue data to be returned by reads and inspect what was written
/// - Simulate unplugging, busy locks and permission errors
/// - Inspect every terminal attribute write
///
/// # Example
/// ```
/// use serial_ports::port::{MockBackend, SerialBackend, TerminalAttributes, TerminalDevice};
/// use std::path::Path;
///
/// let backend = MockBackend::new();
/// backend.add_device("/dev/tty.usbserial-A", TerminalAttributes::default());
/// backend.enqueue_read("/dev/tty.usbserial-A", b"hello");
///
/// let mut device = backend.open_exclusive(Path::new("/dev/tty.usbserial-A")).unwrap();
/// let mut buffer = [0u8; 8];
/// assert_eq!(device.read(&mut buffer).unwrap(), 5);
/// device.close().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    devices: Arc<Mutex<HashMap<PathBuf, MockDeviceState>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-plug) a device with the given starting attributes.
    pub fn add_device(&self, path: impl Into<PathBuf>, attributes: TerminalAttributes) {
        let mut devices = self.devices.lock();
        devices.insert(
            path.into(),
            MockDeviceState {
                attributes,
                ..Default::default()
            },
        );
    }

    /// Simulate unplugging: open handles see device loss, new opens fail.
    pub fn remove_device(&self, path: impl AsRef<Path>) {
        if let Some(state) = self.devices.lock().get_mut(path.as_ref()) {
            state.removed = true;
            state.read_queue.clear();
        }
    }

    /// Enqueue bytes to be returned by subsequent reads.
    pub fn enqueue_read(&self, path: impl AsRef<Path>, data: &[u8]) {
        if let Some(state) = self.devices.lock().get_mut(path.as_ref()) {
            state.read_queue.extend(data);
        }
    }

    /// Make future opens of `path` fail with `PermissionDenied`.
    pub fn deny_access(&self, path: impl AsRef<Path>) {
        if let Some(state) = self.devices.lock().get_mut(path.as_ref()) {
            state.access_denied = true;
        }
    }

    /// Make the next raw-mode configuration of `path` fail.
    pub fn fail_next_configure(&self, path: impl AsRef<Path>) {
        if let Some(state) = self.devices.lock().get_mut(path.as_ref()) {
            state.fail_configure = true;
        }
    }

    /// Attributes currently applied to the device.
    pub fn attributes(&self, path: impl AsRef<Path>) -> Option<TerminalAttributes> {
        self.devices
            .lock()
            .get(path.as_ref())
            .map(|state| state.attributes.clone())
    }

    /// Every attribute set written to the device, oldest first.
    pub fn attribute_writes(&self, path: impl AsRef<Path>) -> Vec<TerminalAttributes> {
        self.devices
            .lock()
            .get(path.as_ref())
            .map(|state| state.attribute_writes.clone())
            .unwrap_or_default()
    }

    /// Raw-mode settings requested for the device, oldest first.
    pub fn raw_configs(&self, path: impl AsRef<Path>) -> Vec<RawModeSettings> {
        self.devices
            .lock()
            .get(path.as_ref())
            .map(|state| state.raw_configs.clone())
            .unwrap_or_default()
    }

    /// Get a copy of all data written to the device.
    pub fn write_log(&self, path: impl AsRef<Path>) -> Vec<Vec<u8>> {
        self.devices
            .lock()
            .get(path.as_ref())
            .map(|state| state.write_log.clone())
            .unwrap_or_default()
    }

    /// Whether an open device currently holds the exclusive lock.
    pub fn is_locked(&self, path: impl AsRef<Path>) -> bool {
        self.devices
            .lock()
            .get(path.as_ref())
            .map(|state| state.locked)
            .unwrap_or(false)
    }
}

impl SerialBackend for MockBackend {
    fn open_exclusive(&self, path: &Path) -> Result<Box<dyn TerminalDevice>, PortError> {
        let mut devices = self.devices.lock();
        let state = devices
            .get_mut(path)
            .filter(|state| !state.removed)
            .ok_or_else(|| PortError::not_found(path.display().to_string()))?;

        if state.access_denied {
            return Err(PortError::PermissionDenied(path.to_path_buf()));
        }
        if state.locked {
            return Err(PortError::Busy(path.to_path_buf()));
        }
        state.locked = true;

        Ok(Box::new(MockDevice {
            path: path.to_path_buf(),
            devices: Arc::clone(&self.devices),
            released: false,
        }))
    }
}

/// An open simulated device.
#[derive(Debug)]
pub struct MockDevice {
    path: PathBuf,
    devices: Arc<Mutex<HashMap<PathBuf, MockDeviceState>>>,
    released: bool,
}

fn device_lost() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "device removed")
}

impl MockDevice {
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut MockDeviceState) -> io::Result<T>,
    ) -> io::Result<T> {
        let mut devices = self.devices.lock();
        match devices.get_mut(&self.path) {
            Some(state) if !state.removed => f(state),
            _ => Err(device_lost()),
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            if let Some(state) = self.devices.lock().get_mut(&self.path) {
                state.locked = false;
            }
        }
    }
}

impl TerminalDevice for MockDevice {
    fn attributes(&self) -> Result<TerminalAttributes, PortError> {
        Ok(self.with_state(|state| Ok(state.attributes.clone()))?)
    }

    fn set_attributes(&mut self, attributes: &TerminalAttributes) -> Result<(), PortError> {
        Ok(self.with_state(|state| {
            state.attributes = attributes.clone();
            state.attribute_writes.push(attributes.clone());
            Ok(())
        })?)
    }

    fn configure_raw(&mut self, settings: &RawModeSettings) -> Result<(), PortError> {
        Ok(self.with_state(|state| {
            if state.fail_configure {
                state.fail_configure = false;
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "tcsetattr failed"));
            }
            // Raw mode clears all line processing; the speed code is the bps value.
            let bps = settings.baud_rate.bps() as u64;
            let raw = TerminalAttributes {
                input_flags: 0,
                output_flags: 0,
                control_flags: state.attributes.control_flags,
                local_flags: 0,
                control_chars: state.attributes.control_chars.clone(),
                input_speed: bps,
                output_speed: bps,
            };
            state.attributes = raw.clone();
            state.attribute_writes.push(raw);
            state.raw_configs.push(*settings);
            Ok(())
        })?)
    }

    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.with_state(|state| {
            let mut bytes_read = 0;
            for byte in buffer.iter_mut() {
                match state.read_queue.pop_front() {
                    Some(queued) => {
                        *byte = queued;
                        bytes_read += 1;
                    }
                    None => break,
                }
            }
            Ok(bytes_read)
        })
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.with_state(|state| {
            state.write_log.push(data.to_vec());
            Ok(data.len())
        })
    }

    fn drain(&mut self) -> io::Result<()> {
        self.with_state(|_| Ok(()))
    }

    fn close(mut self: Box<Self>) -> Result<(), PortError> {
        self.release();
        Ok(())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.release();
    }
}
