//! Port discovery and change notification.
//!
//! The registry scans the device directory with a [`DeviceNaming`] rule and
//! owns a broadcast channel of [`PortsChanged`] events. Events carry no
//! payload; subscribers are expected to call [`PortRegistry::list_ports`] again.

use crate::port::{DeviceNaming, PortError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[cfg(feature = "hot-plug")]
use parking_lot::Mutex;

/// Capacity of the change channel; slower subscribers see `Lagged` and re-list.
const EVENT_CAPACITY: usize = 16;

/// A discovered serial port.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Port {
    /// Short display name, e.g. `usbserial-A`.
    pub name: String,
    /// Full device path, e.g. `/dev/tty.usbserial-A`.
    pub path: PathBuf,
}

/// USB descriptor strings reported by the OS for a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDetails {
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// A port together with whatever the OS enumeration knows about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDetails {
    #[serde(flatten)]
    pub port: Port,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usb: Option<UsbDetails>,
}

/// "The set of ports may have changed."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortsChanged;

/// Discovers serial ports and publishes change events.
pub struct PortRegistry {
    naming: DeviceNaming,
    events: broadcast::Sender<PortsChanged>,
    #[cfg(feature = "hot-plug")]
    watcher: Mutex<Option<Box<dyn notify::Watcher + Send>>>,
}

impl PortRegistry {
    pub fn new(naming: DeviceNaming) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            naming,
            events,
            #[cfg(feature = "hot-plug")]
            watcher: Mutex::new(None),
        }
    }

    pub fn naming(&self) -> &DeviceNaming {
        &self.naming
    }

    /// Scan the device directory for serial ports, sorted by name.
    ///
    /// A directory that cannot be read yields an empty list.
    pub fn list_ports(&self) -> Vec<Port> {
        let dir = self.naming.device_dir();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot scan {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut ports: Vec<Port> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let file_name = entry.file_name();
                let name = self.naming.name_for_entry(file_name.to_str()?)?;
                Some(Port {
                    name,
                    path: entry.path(),
                })
            })
            .collect();
        ports.sort();

        debug!("Found {} serial port(s) in {}", ports.len(), dir.display());
        ports
    }

    /// Resolve a display name to the device path of a node that exists now.
    pub fn device_path_for_name(&self, name: &str) -> Result<PathBuf, PortError> {
        let path = self
            .naming
            .path_for_name(name)
            .ok_or_else(|| PortError::not_found(name))?;

        match path.try_exists() {
            Ok(true) => {
                debug!("Resolved {} to {}", name, path.display());
                Ok(path)
            }
            Ok(false) => Err(PortError::not_found(name)),
            Err(e) => {
                debug!("Cannot stat {}: {}", path.display(), e);
                Err(PortError::not_found(name))
            }
        }
    }

    pub fn has_port(&self, name: &str) -> bool {
        self.device_path_for_name(name).is_ok()
    }

    /// Look up USB details for a port; `None` only when the port is absent.
    pub fn describe(&self, name: &str) -> Option<PortDetails> {
        let path = self.device_path_for_name(name).ok()?;
        let usb = usb_details_for(&path);
        Some(PortDetails {
            port: Port {
                name: name.to_string(),
                path,
            },
            usb,
        })
    }

    /// Subscribe to change events. Each receiver sees every event sent after
    /// it subscribed, unless it falls more than the channel capacity behind.
    pub fn subscribe(&self) -> broadcast::Receiver<PortsChanged> {
        self.events.subscribe()
    }

    /// Publish a change event to all current subscribers.
    pub fn notify_changed(&self) {
        publish(&self.events);
    }

    /// Start watching the device directory for port arrival and removal.
    ///
    /// Uses the platform's native file notification. Calling it again while a
    /// watcher is active does nothing.
    #[cfg(feature = "hot-plug")]
    pub fn watch(&self) -> Result<(), PortError> {
        self.start_watcher(|handler| {
            notify::recommended_watcher(handler)
                .map(|w| Box::new(w) as Box<dyn notify::Watcher + Send>)
        })
    }

    /// Like [`watch`](Self::watch) but rescans every `interval`, for device
    /// filesystems that do not deliver native notifications.
    #[cfg(feature = "hot-plug")]
    pub fn watch_polling(&self, interval: std::time::Duration) -> Result<(), PortError> {
        self.start_watcher(|handler| {
            let config = notify::Config::default().with_poll_interval(interval);
            notify::PollWatcher::new(handler, config)
                .map(|w| Box::new(w) as Box<dyn notify::Watcher + Send>)
        })
    }

    #[cfg(feature = "hot-plug")]
    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    #[cfg(feature = "hot-plug")]
    fn start_watcher<F>(&self, make: F) -> Result<(), PortError>
    where
        F: FnOnce(
            Box<dyn FnMut(notify::Result<notify::Event>) + Send>,
        ) -> notify::Result<Box<dyn notify::Watcher + Send>>,
    {
        use notify::RecursiveMode;

        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }

        let naming = self.naming.clone();
        let events = self.events.clone();
        let handler = Box::new(move |result: notify::Result<notify::Event>| match result {
            Ok(event) if is_port_event(&naming, &event) => publish(&events),
            Ok(_) => {}
            Err(e) => warn!("Device watcher error: {}", e),
        });

        let dir = self.naming.device_dir();
        let mut watcher = make(handler).map_err(watch_error)?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        debug!("Watching {} for port changes", dir.display());
        *slot = Some(watcher);
        Ok(())
    }
}

impl std::fmt::Debug for PortRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("PortRegistry");
        debug
            .field("naming", &self.naming)
            .field("subscribers", &self.events.receiver_count());
        #[cfg(feature = "hot-plug")]
        debug.field("watching", &self.is_watching());
        debug.finish()
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new(DeviceNaming::default())
    }
}

fn publish(events: &broadcast::Sender<PortsChanged>) {
    // No subscribers is not an error.
    let receivers = events.send(PortsChanged).unwrap_or(0);
    debug!("Published port change to {} subscriber(s)", receivers);
}

#[cfg(feature = "hot-plug")]
fn is_port_event(naming: &DeviceNaming, event: &notify::Event) -> bool {
    use notify::event::{EventKind, ModifyKind};

    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    );
    relevant
        && event.paths.iter().any(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| naming.name_for_entry(name))
                .is_some()
        })
}

#[cfg(feature = "hot-plug")]
fn watch_error(err: notify::Error) -> PortError {
    PortError::Io(std::io::Error::other(err))
}

fn usb_details_for(path: &std::path::Path) -> Option<UsbDetails> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            debug!("OS port enumeration failed: {}", e);
            return None;
        }
    };
    let wanted = path.to_str()?;
    ports
        .into_iter()
        .find(|info| info.port_name == wanted)
        .and_then(|info| match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => Some(UsbDetails {
                vid: usb.vid,
                pid: usb.pid,
                serial_number: usb.serial_number,
                manufacturer: usb.manufacturer,
                product: usb.product,
            }),
            _ => None,
        })
}
