//! Serial monitor connection lifecycle.
//!
//! A [`SerialMonitor`] keeps one port's connection state for an interactive
//! tool: it can step aside while an uploader needs the port, follow the port
//! across unplug/replug, and reconnect when the line speed changes.

use crate::port::{BaudRate, PortError};
use crate::session::{PortHandle, PortSession};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Per-port settings remembered between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    pub baud_rate: BaudRate,
    /// Append `\r` to sent lines.
    pub send_cr: bool,
    /// Append `\n` to sent lines.
    pub send_lf: bool,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: BaudRate::default(),
            send_cr: false,
            send_lf: true,
        }
    }
}

impl PortSettings {
    /// Line terminator implied by `send_cr` / `send_lf`.
    pub fn line_ending(&self) -> &'static str {
        match (self.send_cr, self.send_lf) {
            (true, true) => "\r\n",
            (true, false) => "\r",
            (false, true) => "\n",
            (false, false) => "",
        }
    }
}

/// Connection state for one port.
#[derive(Debug)]
pub struct SerialMonitor {
    session: PortSession,
    port: String,
    settings: PortSettings,
    handle: Option<PortHandle>,
    should_reconnect: bool,
    received: String,
}

impl SerialMonitor {
    pub fn new(session: PortSession, port: impl Into<String>, settings: PortSettings) -> Self {
        Self {
            session,
            port: port.into(),
            settings,
            handle: None,
            should_reconnect: false,
            received: String::new(),
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn settings(&self) -> &PortSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether a temporary disconnect is waiting to be undone.
    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    /// Whether the port is currently present.
    pub fn has_valid_port(&self) -> bool {
        self.session.registry().has_port(&self.port)
    }

    /// Open the port. Starts a fresh receive buffer. No-op when connected.
    pub fn connect(&mut self) -> Result<(), PortError> {
        if self.handle.is_none() {
            let handle = self
                .session
                .open(&self.port, self.settings.baud_rate.bps())?;
            self.received.clear();
            self.handle = Some(handle);
        }
        self.should_reconnect = false;
        Ok(())
    }

    /// Close the port and forget any pending reconnect.
    pub fn disconnect(&mut self) -> Result<(), PortError> {
        self.should_reconnect = false;
        self.close_handle()
    }

    /// Close the port but remember to reopen it on [`reconnect`](Self::reconnect).
    pub fn disconnect_temporarily(&mut self) -> Result<(), PortError> {
        if self.handle.is_none() {
            return Ok(());
        }
        let result = self.close_handle();
        self.should_reconnect = true;
        debug!("{} released temporarily", self.port);
        result
    }

    /// Reopen after a temporary disconnect. No-op otherwise.
    pub fn reconnect(&mut self) -> Result<(), PortError> {
        if self.handle.is_none() && self.should_reconnect {
            info!("Reconnecting {}", self.port);
            self.connect()?;
        }
        Ok(())
    }

    /// Change the line speed, reopening the port if it is connected.
    ///
    /// The reopen is attempted even when closing fails. If it does not
    /// succeed the port stays marked for [`reconnect`](Self::reconnect); the
    /// first error is returned.
    pub fn set_baud_rate(&mut self, baud_rate: BaudRate) -> Result<(), PortError> {
        self.settings.baud_rate = baud_rate;
        if self.handle.is_none() {
            return Ok(());
        }
        let closed = self.close_handle();
        let opened = self.connect();
        if opened.is_err() {
            self.should_reconnect = true;
        }
        closed.and(opened)
    }

    pub fn set_line_ending(&mut self, send_cr: bool, send_lf: bool) {
        self.settings.send_cr = send_cr;
        self.settings.send_lf = send_lf;
    }

    /// React to a ports-changed event: follow the port if it came back,
    /// step aside if it vanished.
    pub fn handle_ports_changed(&mut self) -> Result<(), PortError> {
        if self.has_valid_port() {
            self.reconnect()
        } else {
            self.release_vanished();
            Ok(())
        }
    }

    /// Send `text` followed by the configured line ending, as ASCII.
    pub fn send_line(&mut self, text: &str) -> Result<(), PortError> {
        let handle = self.handle.as_mut().ok_or(PortError::Closed)?;
        let mut line = to_ascii_lossy(text);
        line.extend_from_slice(self.settings.line_ending().as_bytes());
        handle.write_all(&line)
    }

    /// Pull available bytes into the receive buffer and return the new text.
    ///
    /// If the device vanished mid-session the port is released and marked
    /// for reconnection.
    pub fn poll(&mut self) -> Result<String, PortError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(String::new());
        };
        let bytes = handle.read_available()?;
        if bytes.is_empty() && !self.has_valid_port() {
            self.release_vanished();
            return Ok(String::new());
        }
        let text = from_ascii_lossy(&bytes);
        self.received.push_str(&text);
        Ok(text)
    }

    /// Everything received since the last connect or clear.
    pub fn received(&self) -> &str {
        &self.received
    }

    pub fn clear_received(&mut self) {
        self.received.clear();
    }

    /// The node is gone, so restoring its attributes cannot succeed; release
    /// the handle anyway and wait for the port to return.
    fn release_vanished(&mut self) {
        if self.handle.is_none() {
            return;
        }
        warn!("{} is gone, waiting for it to return", self.port);
        if let Err(e) = self.disconnect_temporarily() {
            debug!("Releasing vanished {}: {}", self.port, e);
        }
    }

    fn close_handle(&mut self) -> Result<(), PortError> {
        match self.handle.take() {
            Some(mut handle) => handle.close(),
            None => Ok(()),
        }
    }
}

fn to_ascii_lossy(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

fn from_ascii_lossy(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
        .collect()
}
