//! Errors raised while loading, validating or saving configuration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file named explicitly does not exist.
    #[error("no configuration file at '{}'", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode configuration as TOML: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("cannot write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The value parsed but cannot be used, e.g. a zero baud rate.
    #[error("{key}: {message}")]
    Invalid { key: String, message: String },

    /// A `SERIAL_READER_*` override could not be parsed.
    #[error("environment override {var}: {message}")]
    Env { var: String, message: String },

    /// `save` on a loader that was built from defaults only.
    #[error("configuration was not loaded from a file; use save_to")]
    NoPath,
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn env(var: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
