//! End-to-end checks of discovery, exclusive open and restore-on-close
//! against a simulated host.

#[path = "common/mod.rs"]
mod common;

use common::{cooked_attributes, FakeHost};
use pretty_assertions::assert_eq;
use serial_ports::{
    DeviceNaming, HandleState, Port, PortError, PortRegistry, PortSession, ReadOutcome,
    TerminalAttributes,
};
use std::sync::Arc;

#[test]
fn test_single_adapter_scenario() {
    let host = FakeHost::new();
    let path = host.plug("usbserial-A");
    host.add_unrelated_entry("null");
    host.add_unrelated_entry("cu.usbserial-A");

    let ports = host.registry.list_ports();
    assert_eq!(
        ports,
        vec![Port {
            name: "usbserial-A".to_string(),
            path: path.clone(),
        }]
    );

    let session = host.session();
    let mut handle = session.open("usbserial-A", 9600).unwrap();
    assert_eq!(handle.state(), HandleState::Open);
    assert_eq!(handle.path(), path.as_path());

    session.close(&mut handle).unwrap();
    assert_eq!(handle.state(), HandleState::Closed);

    let mut buffer = [0u8; 16];
    assert!(matches!(handle.read(&mut buffer), Err(PortError::Closed)));
    assert!(matches!(handle.write(b"x"), Err(PortError::Closed)));
}

#[test]
fn test_listing_and_resolution_agree() {
    let host = FakeHost::new();
    for name in ["usbmodem1411", "usbserial-A", "usbserial-B", "debug-console"] {
        host.plug(name);
    }

    let ports = host.registry.list_ports();
    assert_eq!(ports.len(), 4);
    for port in ports {
        assert_eq!(
            host.registry.device_path_for_name(&port.name).unwrap(),
            port.path
        );
    }
}

#[test]
fn test_open_absent_port_is_not_found() {
    let host = FakeHost::new();
    let session = host.session();

    for baud in [9600, 19200, 12345] {
        assert!(matches!(
            session.open("usbserial-A", baud),
            Err(PortError::NotFound(_))
        ));
    }

    // Known to the backend but without a node in the directory.
    host.backend
        .add_device(host.path_of("ghost"), cooked_attributes());
    assert!(matches!(
        session.open("ghost", 9600),
        Err(PortError::NotFound(_))
    ));

    // Invalid names never escape the device directory.
    assert!(matches!(
        session.open("../tty.usbserial-A", 9600),
        Err(PortError::NotFound(_))
    ));

    // A rule without prefix must not reach the directory or its parent.
    let bare = PortSession::new(
        Arc::new(PortRegistry::new(
            DeviceNaming::new(host.dir.path(), "", "^.+$").unwrap(),
        )),
        Arc::new(host.backend.clone()),
    );
    for name in [".", ".."] {
        assert!(bare.registry().device_path_for_name(name).is_err());
        assert!(matches!(bare.open(name, 9600), Err(PortError::NotFound(_))));
    }
    assert!(bare.registry().list_ports().is_empty());
}

#[test]
fn test_second_open_is_busy() {
    let host = FakeHost::new();
    host.plug("usbserial-A");
    let session = host.session();

    let mut first = session.open("usbserial-A", 9600).unwrap();
    assert!(matches!(
        session.open("usbserial-A", 115200),
        Err(PortError::Busy(_))
    ));

    // Another session in the same process is refused as well.
    assert!(matches!(
        host.session().open("usbserial-A", 9600),
        Err(PortError::Busy(_))
    ));

    first.close().unwrap();
    let mut again = session.open("usbserial-A", 115200).unwrap();
    again.close().unwrap();
}

#[test]
fn test_permission_denied() {
    let host = FakeHost::new();
    let path = host.plug("usbserial-A");
    host.backend.deny_access(&path);

    assert!(matches!(
        host.session().open("usbserial-A", 9600),
        Err(PortError::PermissionDenied(p)) if p == path
    ));
}

#[test]
fn test_close_restores_attributes_seen_before_open() {
    let host = FakeHost::new();
    let before = TerminalAttributes {
        input_speed: 57600,
        output_speed: 57600,
        ..cooked_attributes()
    };
    let path = host.plug_with("usbserial-A", before.clone());
    let session = host.session();

    for baud in [300, 9600, 230400] {
        let mut handle = session.open("usbserial-A", baud).unwrap();
        let during = host.backend.attributes(&path).unwrap();
        assert_ne!(during, before);
        assert_eq!(during.output_speed, u64::from(baud));

        handle.close().unwrap();
        assert_eq!(host.backend.attributes(&path).unwrap(), before);
    }

    // Raw configuration then restore, three times over.
    let writes = host.backend.attribute_writes(&path);
    assert_eq!(writes.len(), 6);
    assert!(writes.iter().skip(1).step_by(2).all(|w| *w == before));
}

#[test]
fn test_dropped_handle_restores_and_releases() {
    let host = FakeHost::new();
    let path = host.plug("usbserial-A");
    let session = host.session();

    drop(session.open("usbserial-A", 9600).unwrap());

    assert!(!host.backend.is_locked(&path));
    assert_eq!(host.backend.attributes(&path).unwrap(), cooked_attributes());
    session.open("usbserial-A", 9600).unwrap().close().unwrap();
}

#[test]
fn test_read_after_unplug_is_empty() {
    let host = FakeHost::new();
    let path = host.plug("usbserial-A");
    let mut handle = host.session().open("usbserial-A", 9600).unwrap();

    host.backend.enqueue_read(&path, b"boot\r\n");
    assert_eq!(handle.read_available().unwrap(), b"boot\r\n");

    host.unplug("usbserial-A");
    let mut buffer = [0u8; 32];
    assert_eq!(handle.read(&mut buffer).unwrap(), ReadOutcome::DeviceLost);
    assert!(handle.read_available().unwrap().is_empty());
    assert!(host.registry.list_ports().is_empty());

    // The node is gone, so restore fails, but the handle is still released.
    assert!(handle.close().is_err());
    assert_eq!(handle.state(), HandleState::Closed);
    assert!(matches!(handle.close(), Err(PortError::Closed)));
}

#[test]
fn test_replugged_port_opens_again() {
    let host = FakeHost::new();
    host.plug("usbserial-A");
    let session = host.session();
    let handle = session.open("usbserial-A", 9600).unwrap();

    host.unplug("usbserial-A");
    drop(handle);
    assert!(matches!(
        session.open("usbserial-A", 9600),
        Err(PortError::NotFound(_))
    ));

    host.plug("usbserial-A");
    let mut handle = session.open("usbserial-A", 9600).unwrap();
    assert!(handle.is_open());
    handle.close().unwrap();
}

#[test]
fn test_write_reaches_device() {
    let host = FakeHost::new();
    let path = host.plug("usbserial-A");
    let mut handle = host.session().open("usbserial-A", 19200).unwrap();

    handle.write_all(b"M115\n").unwrap();
    handle.drain().unwrap();
    assert_eq!(host.backend.write_log(&path), vec![b"M115\n".to_vec()]);

    handle.close().unwrap();
}
