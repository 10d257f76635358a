//! Background serial port reader.
//!
//! Opens serial ports by name, polls each one on its own Tokio task and hands
//! every chunk of received text to the callbacks registered for that port.
//! A port can be owned by at most one reader session at a time.
//!
//! # Modules
//!
//! - `reader`: [`SerialPortReader`], the create/remove entry point
//! - `session`: one open port and its polling task
//! - `registry`: the table of open sessions keyed by port name
//! - `handlers`: opened/data/closed subscriber lists
//! - `chunk`: turning raw reads into delivered text
//! - `port`: platform boundary, `serialport` backend and mocks
//! - `config`: TOML configuration with environment overrides
//! - `logging`: `tracing` subscriber setup for binaries
//! - `error`: reader error types

pub mod chunk;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod port;
pub mod reader;
pub mod registry;
pub mod session;

pub use error::{ReaderError, ReaderResult, ValidationReason};
pub use handlers::SessionHandlers;
pub use port::{highest_numbered_port, PortBackend, PortError, PortLine, SystemPortBackend};
pub use reader::{ReaderConfig, SerialPortReader, SessionOptions};
pub use registry::SessionRegistry;
pub use session::{SessionConfig, SessionInfo};

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
