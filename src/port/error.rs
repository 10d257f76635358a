//! Port-specific error types.
//!
//! These describe failures of the platform serial layer. The session manager
//! wraps them in [`crate::ReaderError`] together with the port they concern.

use thiserror::Error;

/// Errors that can occur during serial port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("Serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during port operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration was rejected (bad baud rate, unsupported setting).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Attempted to use a port that's not open.
    #[error("Port is not open")]
    NotOpen,

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error only means "nothing to read right now".
    ///
    /// Serial drivers report an empty receive buffer as a timeout or a
    /// would-block I/O error depending on the platform.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
            )
        )
    }
}
