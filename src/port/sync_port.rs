//! Hardware serial ports backed by the `serialport` crate.
//!
//! [`SystemPortBackend`] is the production [`PortBackend`]; the lines it
//! opens are [`SyncSerialPort`] values.

use super::error::PortError;
use super::traits::{PortBackend, PortConfiguration, PortLine};
use std::io::{Read, Write};
use tracing::debug;

/// Serial device opened through `serialport`.
///
/// The handle is released by [`PortLine::close`] or when the value is dropped.
pub struct SyncSerialPort {
    /// The underlying serial port; `None` once closed.
    port: Option<Box<dyn serialport::SerialPort>>,
    /// The port name/path for identification.
    name: String,
}

impl SyncSerialPort {
    /// Open a serial port with the given configuration.
    ///
    /// # Example
    /// ```no_run
    /// use serial_port_reader::port::{PortConfiguration, SyncSerialPort};
    ///
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", &PortConfiguration::with_baud(115200))?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str, config: &PortConfiguration) -> Result<Self, PortError> {
        if config.baud_rate == 0 {
            return Err(PortError::config("baud rate must be positive"));
        }

        let port = serialport::new(port_name, config.baud_rate)
            .timeout(config.timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        Ok(Self {
            port: Some(port),
            name: port_name.to_string(),
        })
    }

    fn handle(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, PortError> {
        self.port.as_mut().ok_or(PortError::NotOpen)
    }
}

impl PortLine for SyncSerialPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read_available(&mut self) -> Result<Vec<u8>, PortError> {
        let port = self.handle()?;
        let pending = port.bytes_to_read().map_err(PortError::Serial)? as usize;
        if pending == 0 {
            return Ok(Vec::new());
        }

        let mut buffer = vec![0u8; pending];
        let read = match port.read(&mut buffer) {
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                0
            }
            Err(e) => return Err(PortError::Io(e)),
        };
        buffer.truncate(read);
        Ok(buffer)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.handle()?.write(data).map_err(PortError::Io)
    }

    fn close(&mut self) -> Result<(), PortError> {
        let mut port = self.port.take().ok_or(PortError::NotOpen)?;
        // Dropping the box releases the OS handle; flush first so queued
        // output is not lost.
        port.flush().map_err(PortError::Io)
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.as_ref().and_then(|p| p.baud_rate().ok()))
            .finish()
    }
}

/// [`PortBackend`] for the host's real serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPortBackend;

impl PortBackend for SystemPortBackend {
    fn enumerate(&self) -> Result<Vec<String>, PortError> {
        let ports = serialport::available_ports()?;
        debug!(count = ports.len(), "Enumerated serial ports");
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    fn open(
        &self,
        name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn PortLine>, PortError> {
        Ok(Box::new(SyncSerialPort::open(name, config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_not_found_error() {
        let result = SyncSerialPort::open("/dev/nonexistent_port_12345", &PortConfiguration::default());

        match result {
            Err(PortError::NotFound(name)) => assert!(name.contains("nonexistent")),
            // Some platforms report a missing node as a generic I/O failure.
            Err(PortError::Serial(_)) | Err(PortError::Io(_)) => {}
            other => panic!("Expected open failure, got: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_zero_baud_rejected_before_open() {
        let result = SyncSerialPort::open("COM1", &PortConfiguration::with_baud(0));
        assert!(matches!(result, Err(PortError::Config(_))));
    }

    #[test]
    fn test_system_backend_open_missing_port_fails() {
        let backend = SystemPortBackend;
        assert!(backend
            .open("/dev/nonexistent_port_12345", &PortConfiguration::default())
            .is_err());
    }
}
