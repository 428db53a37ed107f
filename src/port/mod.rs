//! Port abstraction layer for terminal devices.
//!
//! Provides the naming rule, the backend traits and their implementations,
//! enabling dependency injection and testing via mocks.

pub mod error;
pub mod mock;
pub mod naming;
pub mod traits;

#[cfg(unix)]
pub mod posix;

pub use error::PortError;
pub use mock::MockBackend;
pub use naming::DeviceNaming;
pub use traits::*;

#[cfg(unix)]
pub use posix::PosixBackend;
