//! TOML configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the first of these that exists:
//!
//! 1. `SERIAL_READER_CONFIG` environment variable (explicit path)
//! 2. `./serial-reader.toml` (current directory)
//! 3. `~/.config/serial-port-reader/config.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\serial-port-reader\config.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Values can be overridden with `SERIAL_READER_<SECTION>_<KEY>`, e.g.
//! `SERIAL_READER_SERIAL_DEFAULT_BAUD=115200` or
//! `SERIAL_READER_MONITOR_PORT=COM7`.
//!
//! # Example
//!
//! ```no_run
//! use serial_port_reader::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! println!("Default baud: {}", loader.config().serial.default_baud);
//! # Ok::<(), serial_port_reader::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, MonitorConfig, SerialConfig};
