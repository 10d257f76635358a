//! Errors surfaced to callers of [`crate::SerialPortReader`].
//!
//! Every failure of `create`/`remove` is reported synchronously through
//! [`ReaderError`]; nothing raised by the facade is swallowed. Failures inside
//! a running polling loop are never surfaced here, they are logged instead.

use crate::port::PortError;
use thiserror::Error;

/// Why a request was rejected before any device I/O happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    /// The port name was empty.
    EmptyName,
    /// The platform does not currently list the port.
    NotFound,
    /// A session for the port is already open or being opened.
    AlreadyOpen,
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "port name cannot be empty"),
            Self::NotFound => write!(f, "port not found"),
            Self::AlreadyOpen => write!(f, "port is already open"),
        }
    }
}

/// Unified error type of the session manager.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Input rejected before touching the device; fix the input and retry.
    #[error("port '{port}' rejected: {reason}")]
    Validation {
        port: String,
        reason: ValidationReason,
    },

    /// The platform port list could not be read.
    #[error("serial ports could not be enumerated: {0}")]
    Enumeration(#[source] PortError),

    /// The device refused to open (permission, missing, busy, bad baud rate).
    #[error("port '{port}' cannot be opened: {source}")]
    PortOpen {
        port: String,
        #[source]
        source: PortError,
    },

    /// No session is registered under the name.
    #[error("port '{port}' has no open session")]
    PortNotFound { port: String },

    /// The session was torn down but releasing the device reported an error.
    #[error("port '{port}' closed with error: {source}")]
    PortClose {
        port: String,
        #[source]
        source: PortError,
    },

    /// The reader has been shut down and opens no more ports.
    #[error("port '{port}' cannot be opened: reader is shut down")]
    ShutDown { port: String },

    /// Writing to an open session failed.
    #[error("write to port '{port}' failed: {source}")]
    Write {
        port: String,
        #[source]
        source: PortError,
    },
}

impl ReaderError {
    pub(crate) fn validation(port: &str, reason: ValidationReason) -> Self {
        Self::Validation {
            port: port.to_string(),
            reason,
        }
    }

    /// The validation reason, if this is a validation failure.
    pub fn validation_reason(&self) -> Option<ValidationReason> {
        match self {
            Self::Validation { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Whether the request was rejected before any device I/O.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// The port the error concerns, when there is one.
    pub fn port(&self) -> Option<&str> {
        match self {
            Self::Validation { port, .. }
            | Self::PortOpen { port, .. }
            | Self::PortNotFound { port }
            | Self::ShutDown { port }
            | Self::PortClose { port, .. }
            | Self::Write { port, .. } => Some(port),
            Self::Enumeration(_) => None,
        }
    }
}

/// Convenient Result type for facade operations.
pub type ReaderResult<T> = Result<T, ReaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_reasons_are_distinct() {
        let reasons = [
            ValidationReason::EmptyName,
            ValidationReason::NotFound,
            ValidationReason::AlreadyOpen,
        ];
        let messages: std::collections::HashSet<String> =
            reasons.iter().map(ToString::to_string).collect();
        assert_eq!(messages.len(), reasons.len());
    }

    #[test]
    fn test_display_includes_port_and_reason() {
        let err = ReaderError::validation("COM3", ValidationReason::AlreadyOpen);
        assert_eq!(err.to_string(), "port 'COM3' rejected: port is already open");
        assert_eq!(err.validation_reason(), Some(ValidationReason::AlreadyOpen));
        assert!(err.is_validation());
        assert_eq!(err.port(), Some("COM3"));
    }

    #[test]
    fn test_open_error_preserves_platform_message() {
        let err = ReaderError::PortOpen {
            port: "COM4".into(),
            source: PortError::config("access denied"),
        };
        assert!(err.to_string().contains("access denied"));
        assert!(!err.is_validation());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_enumeration_has_no_port() {
        let err = ReaderError::Enumeration(PortError::NotOpen);
        assert_eq!(err.port(), None);
        assert_eq!(err.validation_reason(), None);
    }

    #[test]
    fn test_shut_down_is_not_a_validation_failure() {
        let err = ReaderError::ShutDown { port: "COM2".into() };
        assert_eq!(err.to_string(), "port 'COM2' cannot be opened: reader is shut down");
        assert!(!err.is_validation());
        assert_eq!(err.port(), Some("COM2"));
    }
}
