//! Device naming rule shared by discovery and name resolution.
//!
//! A directory entry is a serial port when it starts with `prefix` and the
//! remainder matches `pattern`; that remainder is the display name. Resolving
//! a name is the exact inverse, so both directions always agree.

use regex::Regex;
use std::path::{Path, PathBuf};

/// Default node prefix on macOS, where `/dev/tty.usbserial-A` is shown as `usbserial-A`.
#[cfg(target_os = "macos")]
pub const DEFAULT_PREFIX: &str = "tty.";
#[cfg(target_os = "macos")]
pub const DEFAULT_PATTERN: &str = "^.+$";

/// Elsewhere nodes keep their full name: `/dev/ttyUSB0` is shown as `ttyUSB0`.
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_PREFIX: &str = "";
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_PATTERN: &str = "^tty(USB|ACM)[0-9]+$";

pub const DEFAULT_DEVICE_DIR: &str = "/dev";

#[derive(Debug, Clone)]
pub struct DeviceNaming {
    device_dir: PathBuf,
    prefix: String,
    pattern: Regex,
}

impl DeviceNaming {
    pub fn new(
        device_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        pattern: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            device_dir: device_dir.into(),
            prefix: prefix.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn device_dir(&self) -> &Path {
        &self.device_dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Whether `name` is a display name this rule can produce.
    pub fn is_valid_name(&self, name: &str) -> bool {
        if name.is_empty() || name.contains('/') {
            return false;
        }
        // The node must be an entry inside the directory, not the directory itself or its parent.
        let entry = format!("{}{}", self.prefix, name);
        !matches!(entry.as_str(), "." | "..") && self.pattern.is_match(name)
    }

    /// Display name for a directory entry, if the entry is a serial port.
    pub fn name_for_entry(&self, file_name: &str) -> Option<String> {
        let name = file_name.strip_prefix(self.prefix.as_str())?;
        self.is_valid_name(name).then(|| name.to_string())
    }

    /// Device path for a display name, without checking that it exists.
    pub fn path_for_name(&self, name: &str) -> Option<PathBuf> {
        self.is_valid_name(name)
            .then(|| self.device_dir.join(format!("{}{}", self.prefix, name)))
    }
}

impl Default for DeviceNaming {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from(DEFAULT_DEVICE_DIR),
            prefix: DEFAULT_PREFIX.to_string(),
            pattern: Regex::new(DEFAULT_PATTERN).expect("default pattern is valid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn macos_style() -> DeviceNaming {
        DeviceNaming::new("/dev", "tty.", "^.+$").unwrap()
    }

    fn linux_style() -> DeviceNaming {
        DeviceNaming::new("/dev", "", "^tty(USB|ACM)[0-9]+$").unwrap()
    }

    #[test]
    fn test_macos_style_mapping() {
        let naming = macos_style();
        assert_eq!(
            naming.name_for_entry("tty.usbserial-A"),
            Some("usbserial-A".to_string())
        );
        assert_eq!(
            naming.path_for_name("usbserial-A"),
            Some(PathBuf::from("/dev/tty.usbserial-A"))
        );
        assert_eq!(naming.name_for_entry("cu.usbserial-A"), None);
        assert_eq!(naming.name_for_entry("tty."), None);
    }

    #[test]
    fn test_linux_style_mapping() {
        let naming = linux_style();
        assert_eq!(naming.name_for_entry("ttyUSB0"), Some("ttyUSB0".to_string()));
        assert_eq!(naming.name_for_entry("ttyACM12"), Some("ttyACM12".to_string()));
        assert_eq!(naming.name_for_entry("ttyS0"), None);
        assert_eq!(naming.name_for_entry("null"), None);
        assert_eq!(naming.path_for_name("ttyS0"), None);
    }

    #[test]
    fn test_rejects_path_traversal() {
        let naming = macos_style();
        assert_eq!(naming.path_for_name("../etc/passwd"), None);
        assert_eq!(naming.path_for_name(""), None);
    }

    #[test]
    fn test_rejects_dot_entries() {
        let naming = DeviceNaming::new("/dev", "", "^.+$").unwrap();
        assert_eq!(naming.path_for_name("."), None);
        assert_eq!(naming.path_for_name(".."), None);
        assert_eq!(naming.name_for_entry(".."), None);
        assert_eq!(
            naming.path_for_name("..."),
            Some(PathBuf::from("/dev/..."))
        );

        // `tty.` + `.` is an ordinary entry name.
        assert!(macos_style().path_for_name(".").is_some());

        let dotted = DeviceNaming::new("/dev", ".", "^.+$").unwrap();
        assert_eq!(dotted.path_for_name("."), None);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(DeviceNaming::new("/dev", "", "(unclosed").is_err());
    }

    proptest! {
        #[test]
        fn resolution_inverts_discovery(name in "[A-Za-z0-9._-]{1,24}") {
            let naming = macos_style();
            let path = naming.path_for_name(&name).unwrap();
            let entry = path.file_name().unwrap().to_str().unwrap();
            prop_assert_eq!(naming.name_for_entry(entry), Some(name));
        }
    }
}
