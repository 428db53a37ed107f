//! Shared test utilities for serial-ports integration tests.
//!
//! This module provides a fake host: a temporary device directory whose
//! entries are matched by a macOS-style naming rule, paired with a
//! `MockBackend` that simulates the devices behind those entries.

#![allow(dead_code)]

use serial_ports::{DeviceNaming, MockBackend, PortRegistry, PortSession, TerminalAttributes};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A simulated host with a device directory and mock backend.
pub struct FakeHost {
    pub dir: TempDir,
    pub backend: MockBackend,
    pub registry: Arc<PortRegistry>,
}

impl FakeHost {
    /// Create an empty host. Nodes are named `tty.<name>`.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp device dir");
        let naming = DeviceNaming::new(dir.path(), "tty.", "^.+$").expect("valid naming rule");
        Self {
            dir,
            backend: MockBackend::new(),
            registry: Arc::new(PortRegistry::new(naming)),
        }
    }

    /// A session over this host's mock devices.
    pub fn session(&self) -> PortSession {
        PortSession::new(Arc::clone(&self.registry), Arc::new(self.backend.clone()))
    }

    /// Device path the naming rule assigns to `name`.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("tty.{name}"))
    }

    /// Plug in a device with cooked-mode attributes.
    pub fn plug(&self, name: &str) -> PathBuf {
        self.plug_with(name, cooked_attributes())
    }

    pub fn plug_with(&self, name: &str, attributes: TerminalAttributes) -> PathBuf {
        let path = self.path_of(name);
        File::create(&path).expect("create device node");
        self.backend.add_device(&path, attributes);
        path
    }

    /// Unplug a device: its node disappears and open handles lose it.
    pub fn unplug(&self, name: &str) {
        let path = self.path_of(name);
        self.backend.remove_device(&path);
        std::fs::remove_file(&path).expect("remove device node");
    }

    /// Create a directory entry that does not follow the naming rule.
    pub fn add_unrelated_entry(&self, entry: &str) {
        File::create(self.dir.path().join(entry)).expect("create entry");
    }
}

/// Typical attributes of a freshly opened tty in canonical mode.
pub fn cooked_attributes() -> TerminalAttributes {
    TerminalAttributes {
        input_flags: 0x2b02,
        output_flags: 0x3,
        control_flags: 0x4b00,
        local_flags: 0x5cb,
        control_chars: vec![4, 255, 255, 127, 23, 21, 18, 255, 3, 28, 26, 25, 17, 19, 22, 15, 1, 0],
        input_speed: 9600,
        output_speed: 9600,
    }
}
