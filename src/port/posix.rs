//! POSIX terminal backend.
//!
//! Opens device nodes with `O_NOCTTY`, takes both the `TIOCEXCL` tty lock and
//! an advisory `flock`, and drives termios through `libc`.

use super::error::PortError;
use super::traits::{RawModeSettings, SerialBackend, TerminalAttributes, TerminalDevice};
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Backend for real device nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixBackend;

impl PosixBackend {
    pub fn new() -> Self {
        Self
    }
}

impl SerialBackend for PosixBackend {
    fn open_exclusive(&self, path: &Path) -> Result<Box<dyn TerminalDevice>, PortError> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| PortError::not_found(path.display().to_string()))?;

        // Non-blocking so a modem-control line cannot stall the open itself.
        let fd = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK | libc::O_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(PortError::from_open_error(path, io::Error::last_os_error()));
        }

        // SAFETY: `fd` was just returned by a successful open(2) and is owned by nobody else.
        let device = PosixDevice {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            path: path.to_path_buf(),
        };
        device.lock_exclusive()?;
        device.set_blocking()?;

        debug!("Opened {} as fd {}", path.display(), device.fd.as_raw_fd());
        Ok(Box::new(device))
    }
}

/// An open tty descriptor. Dropping it without `close` still releases the fd.
#[derive(Debug)]
pub struct PosixDevice {
    fd: OwnedFd,
    path: PathBuf,
}

impl PosixDevice {
    fn raw(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    fn lock_exclusive(&self) -> Result<(), PortError> {
        if unsafe { libc::flock(self.raw(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
            return Err(PortError::from_open_error(&self.path, io::Error::last_os_error()));
        }
        if unsafe { libc::ioctl(self.raw(), libc::TIOCEXCL as _) } != 0 {
            return Err(PortError::from_open_error(&self.path, io::Error::last_os_error()));
        }
        Ok(())
    }

    fn set_blocking(&self) -> Result<(), PortError> {
        let flags = unsafe { libc::fcntl(self.raw(), libc::F_GETFL) };
        if flags < 0
            || unsafe { libc::fcntl(self.raw(), libc::F_SETFL, flags & !libc::O_NONBLOCK) } < 0
        {
            return Err(PortError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn termios(&self) -> Result<libc::termios, PortError> {
        let mut termios: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(self.raw(), &mut termios) } != 0 {
            return Err(PortError::Io(io::Error::last_os_error()));
        }
        Ok(termios)
    }

    fn apply(&self, termios: &libc::termios) -> Result<(), PortError> {
        if unsafe { libc::tcsetattr(self.raw(), libc::TCSANOW, termios) } != 0 {
            return Err(PortError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }
}

/// Map a validated line speed to its termios speed code.
fn speed_code(bps: u32) -> Option<libc::speed_t> {
    let code = match bps {
        300 => libc::B300,
        600 => libc::B600,
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        _ => return None,
    };
    Some(code)
}

/// VTIME counts tenths of a second in a single byte.
fn vtime_for(timeout: std::time::Duration) -> libc::cc_t {
    let deciseconds = timeout.as_millis().div_ceil(100);
    deciseconds.min(u8::MAX as u128) as libc::cc_t
}

impl TerminalDevice for PosixDevice {
    fn attributes(&self) -> Result<TerminalAttributes, PortError> {
        let termios = self.termios()?;
        Ok(TerminalAttributes {
            input_flags: termios.c_iflag as u64,
            output_flags: termios.c_oflag as u64,
            control_flags: termios.c_cflag as u64,
            local_flags: termios.c_lflag as u64,
            control_chars: termios.c_cc.to_vec(),
            input_speed: unsafe { libc::cfgetispeed(&termios) } as u64,
            output_speed: unsafe { libc::cfgetospeed(&termios) } as u64,
        })
    }

    fn set_attributes(&mut self, attributes: &TerminalAttributes) -> Result<(), PortError> {
        // Start from the live record so platform-only fields survive.
        let mut termios = self.termios()?;
        termios.c_iflag = attributes.input_flags as libc::tcflag_t;
        termios.c_oflag = attributes.output_flags as libc::tcflag_t;
        termios.c_cflag = attributes.control_flags as libc::tcflag_t;
        termios.c_lflag = attributes.local_flags as libc::tcflag_t;
        for (slot, value) in termios.c_cc.iter_mut().zip(&attributes.control_chars) {
            *slot = *value;
        }
        unsafe {
            libc::cfsetispeed(&mut termios, attributes.input_speed as libc::speed_t);
            libc::cfsetospeed(&mut termios, attributes.output_speed as libc::speed_t);
        }
        self.apply(&termios)
    }

    fn configure_raw(&mut self, settings: &RawModeSettings) -> Result<(), PortError> {
        let bps = settings.baud_rate.bps();
        let speed = speed_code(bps).ok_or(PortError::UnsupportedBaudRate(bps))?;

        let mut termios = self.termios()?;
        termios.c_iflag &= !(libc::IGNBRK
            | libc::BRKINT
            | libc::PARMRK
            | libc::ISTRIP
            | libc::INLCR
            | libc::IGNCR
            | libc::ICRNL
            | libc::IXON
            | libc::IXOFF
            | libc::IXANY);
        termios.c_oflag &= !libc::OPOST;
        termios.c_cflag &= !(libc::CSIZE | libc::PARENB | libc::CSTOPB | libc::CRTSCTS);
        termios.c_cflag |= libc::CS8 | libc::CLOCAL | libc::CREAD;
        termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
        termios.c_cc[libc::VMIN] = 0;
        termios.c_cc[libc::VTIME] = vtime_for(settings.read_timeout);

        unsafe {
            libc::cfsetispeed(&mut termios, speed);
            libc::cfsetospeed(&mut termios, speed);
        }
        self.apply(&termios)?;

        if unsafe { libc::tcflush(self.raw(), libc::TCIFLUSH) } != 0 {
            warn!(
                "Failed to flush input on {}: {}",
                self.path.display(),
                io::Error::last_os_error()
            );
        }
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = unsafe {
                libc::read(
                    self.raw(),
                    buffer.as_mut_ptr() as *mut libc::c_void,
                    buffer.len(),
                )
            };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        loop {
            let n = unsafe {
                libc::write(self.raw(), data.as_ptr() as *const libc::c_void, data.len())
            };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    fn drain(&mut self) -> io::Result<()> {
        if unsafe { libc::tcdrain(self.raw()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), PortError> {
        let path = self.path;
        let fd = self.fd.into_raw_fd();
        // close(2) also drops the flock; TIOCEXCL is cleared on last close.
        if unsafe { libc::close(fd) } != 0 {
            return Err(PortError::Io(io::Error::last_os_error()));
        }
        debug!("Closed {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_speed_codes_cover_standard_rates() {
        for bps in super::super::traits::STANDARD_BAUD_RATES {
            assert!(speed_code(bps).is_some(), "missing speed code for {bps}");
        }
        assert!(speed_code(14400).is_none());
    }

    #[test]
    fn test_vtime_rounding() {
        assert_eq!(vtime_for(Duration::ZERO), 0);
        assert_eq!(vtime_for(Duration::from_millis(50)), 1);
        assert_eq!(vtime_for(Duration::from_millis(1000)), 10);
        assert_eq!(vtime_for(Duration::from_secs(600)), 255);
    }

    #[test]
    fn test_open_missing_node_is_not_found() {
        let result = PosixBackend::new().open_exclusive(Path::new("/dev/nonexistent_port_12345"));
        assert!(matches!(result, Err(PortError::NotFound(_))));
    }

    /// A pseudo-terminal pair; the slave stands in for a serial adapter.
    #[cfg(target_os = "linux")]
    struct Pty {
        master: OwnedFd,
        slave: OwnedFd,
        path: PathBuf,
    }

    #[cfg(target_os = "linux")]
    fn open_pty() -> Option<Pty> {
        let (mut master, mut slave) = (-1, -1);
        let rc = unsafe {
            libc::openpty(
                &mut master,
                &mut slave,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        if rc != 0 {
            println!("Skipping: no pseudo-terminal available");
            return None;
        }
        let (master, slave) =
            unsafe { (OwnedFd::from_raw_fd(master), OwnedFd::from_raw_fd(slave)) };

        let mut name = [0 as libc::c_char; 128];
        if unsafe { libc::ttyname_r(slave.as_raw_fd(), name.as_mut_ptr(), name.len()) } != 0 {
            return None;
        }
        let path = unsafe { std::ffi::CStr::from_ptr(name.as_ptr()) }
            .to_str()
            .ok()
            .map(PathBuf::from)?;
        Some(Pty {
            master,
            slave,
            path,
        })
    }

    #[cfg(target_os = "linux")]
    fn local_flags(fd: &OwnedFd) -> libc::tcflag_t {
        let mut termios: libc::termios = unsafe { std::mem::zeroed() };
        assert_eq!(unsafe { libc::tcgetattr(fd.as_raw_fd(), &mut termios) }, 0);
        termios.c_lflag
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pty_lock_restore_and_hangup() {
        use crate::port::{DeviceNaming, ReadOutcome};
        use crate::registry::PortRegistry;
        use crate::session::PortSession;
        use std::sync::Arc;

        let Some(pty) = open_pty() else { return };
        let name = pty
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap()
            .to_string();
        let naming = DeviceNaming::new("/dev/pts", "", "^[0-9]+$").unwrap();
        let session = PortSession::new(
            Arc::new(PortRegistry::new(naming)),
            Arc::new(PosixBackend::new()),
        )
        .with_read_timeout(Duration::from_millis(100));

        let before = local_flags(&pty.slave);
        assert_ne!(before & libc::ICANON, 0);

        let mut handle = session.open(&name, 115200).unwrap();
        assert!(matches!(session.open(&name, 9600), Err(PortError::Busy(_))));
        assert_eq!(local_flags(&pty.slave) & (libc::ICANON | libc::ECHO), 0);

        let mut buffer = [0u8; 16];
        assert_eq!(handle.read(&mut buffer).unwrap(), ReadOutcome::Idle);
        handle.close().unwrap();
        assert_eq!(local_flags(&pty.slave), before);

        // Closing the master side hangs up the line.
        let mut handle = session.open(&name, 9600).unwrap();
        drop(pty.master);
        assert_eq!(handle.read(&mut buffer).unwrap(), ReadOutcome::DeviceLost);
        let _ = handle.close();
    }

    #[test]
    fn test_open_regular_file_fails_termios() {
        // A plain file opens and locks but is not a tty.
        let file = tempfile::NamedTempFile::new().unwrap();
        let device = PosixBackend::new().open_exclusive(file.path());
        match device {
            Ok(device) => assert!(device.attributes().is_err()),
            Err(e) => assert!(matches!(e, PortError::Io(_))),
        }
    }
}
