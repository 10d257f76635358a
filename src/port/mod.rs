//! Port abstraction layer for serial communication.
//!
//! Provides the platform boundary ([`PortBackend`], [`PortLine`]), the
//! `serialport`-backed implementation and in-memory mocks, enabling
//! dependency injection and testing.

pub mod error;
pub mod mock;
pub mod names;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockPortBackend, MockPortLine};
pub use names::{highest_numbered_port, DEFAULT_PORT_PREFIX};
pub use sync_port::{SyncSerialPort, SystemPortBackend};
pub use traits::*;
