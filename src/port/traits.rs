//! Core traits for the platform serial boundary.
//!
//! [`PortBackend`] enumerates and opens devices, [`PortLine`] is one opened
//! device. Both real hardware and the mocks in [`super::mock`] implement
//! them, so sessions can be driven without a physical port.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default baud rate used when the caller does not pick one.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Parameters used when opening a serial device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second). Must be positive.
    pub baud_rate: u32,

    /// Upper bound for a single driver read or write call.
    ///
    /// Reads only ever request bytes the driver already reports as
    /// buffered, so this bound is rarely reached.
    pub timeout: Duration,
}

impl PortConfiguration {
    /// Configuration with the given baud rate and the default timeout.
    pub fn with_baud(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(10),
        }
    }
}

/// One opened serial device.
///
/// A line is owned by exactly one session. Implementations must never block
/// in [`PortLine::read_available`]: it returns whatever the driver has
/// buffered, possibly nothing.
pub trait PortLine: Send + std::fmt::Debug {
    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Whether the underlying handle is still held.
    fn is_open(&self) -> bool;

    /// Read every byte currently buffered by the device.
    ///
    /// Returns an empty vector when nothing has arrived since the last call.
    fn read_available(&mut self) -> Result<Vec<u8>, PortError>;

    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Release the device handle.
    ///
    /// Closing an already closed line returns [`PortError::NotOpen`].
    fn close(&mut self) -> Result<(), PortError>;
}

/// Platform serial layer: port enumeration and device opening.
#[cfg_attr(test, mockall::automock)]
pub trait PortBackend: Send + Sync {
    /// Names of the serial ports currently present on the host.
    fn enumerate(&self) -> Result<Vec<String>, PortError>;

    /// Open the named device.
    fn open(&self, name: &str, config: &PortConfiguration)
        -> Result<Box<dyn PortLine>, PortError>;
}
