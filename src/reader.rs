//! Public entry point: create and remove port readers.
//!
//! # Architecture
//!
//! ```text
//! consumer ──create/remove──> SerialPortReader ──> SessionRegistry
//!                                   │                    │
//!                                   └──> PortBackend     └──> Session ──> PortLine
//! ```
//!
//! The reader owns the registry, so every open port belongs to exactly one
//! reader. Call [`SerialPortReader::shutdown`] before dropping it to close
//! remaining ports with their closed notifications.

use crate::config::SerialConfig;
use crate::error::{ReaderError, ReaderResult, ValidationReason};
use crate::handlers::SessionHandlers;
use crate::port::{highest_numbered_port, PortBackend, PortError, SystemPortBackend, DEFAULT_PORT_PREFIX};
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionConfig, SessionInfo, DEFAULT_TICK};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Pause between checks while shutdown waits for opens and closes it does
/// not own.
const SHUTDOWN_RETRY: Duration = Duration::from_millis(1);

/// Settings shared by every session a reader creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Length of one scheduler tick; zero-interval sessions poll once per tick.
    pub tick: Duration,
    /// Remove line terminators from chunks unless a request says otherwise.
    pub strip_terminators: bool,
    /// Naming convention used by [`SerialPortReader::highest_numbered_port`].
    pub port_prefix: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            strip_terminators: true,
            port_prefix: DEFAULT_PORT_PREFIX.to_string(),
        }
    }
}

impl From<&SerialConfig> for ReaderConfig {
    fn from(serial: &SerialConfig) -> Self {
        Self {
            tick: serial.tick_interval(),
            strip_terminators: serial.strip_terminators,
            port_prefix: serial.port_prefix.clone(),
        }
    }
}

/// Everything needed to open one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub port_name: String,
    pub baud_rate: u32,
    pub poll_interval: Duration,
    /// Overrides [`ReaderConfig::strip_terminators`] when set.
    pub strip_terminators: Option<bool>,
}

impl SessionOptions {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            poll_interval: Duration::ZERO,
            strip_terminators: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_strip_terminators(mut self, strip: bool) -> Self {
        self.strip_terminators = Some(strip);
        self
    }
}

/// Opens serial ports in the background and routes their data to callbacks.
///
/// # Example
/// ```
/// use serial_port_reader::port::MockPortBackend;
/// use serial_port_reader::{ReaderConfig, SerialPortReader, SessionHandlers};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockPortBackend::with_ports(["COM5"]);
/// let reader = SerialPortReader::new(backend, ReaderConfig::default());
///
/// let handlers = SessionHandlers::new().on_data(|chunk| println!("{chunk}"));
/// reader.create("COM5", 9600, handlers, Duration::ZERO)?;
/// assert!(reader.is_open("COM5"));
///
/// reader.remove("COM5").await?;
/// assert!(!reader.is_open("COM5"));
/// # Ok(())
/// # }
/// ```
pub struct SerialPortReader {
    backend: Arc<dyn PortBackend>,
    registry: Arc<SessionRegistry>,
    config: ReaderConfig,
}

impl SerialPortReader {
    /// Reader over the given platform backend.
    pub fn new(backend: impl PortBackend + 'static, config: ReaderConfig) -> Self {
        Self::with_backend(Arc::new(backend), config)
    }

    /// Reader over a shared platform backend.
    pub fn with_backend(backend: Arc<dyn PortBackend>, config: ReaderConfig) -> Self {
        Self {
            backend,
            registry: Arc::new(SessionRegistry::new()),
            config,
        }
    }

    /// Reader over the host's real serial ports.
    pub fn system(config: ReaderConfig) -> Self {
        Self::new(SystemPortBackend, config)
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Start reading `port_name` in the background.
    ///
    /// Rejected, in this order, when the name is empty, when the platform
    /// does not list the port, or when the port is already open. Once this
    /// returns `Ok` the opened subscribers have run and polling has begun.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create(
        &self,
        port_name: &str,
        baud_rate: u32,
        handlers: SessionHandlers,
        poll_interval: Duration,
    ) -> ReaderResult<()> {
        let options = SessionOptions::new(port_name, baud_rate).with_poll_interval(poll_interval);
        self.create_with(options, handlers)
    }

    /// [`Self::create`] with the full option set.
    pub fn create_with(&self, options: SessionOptions, handlers: SessionHandlers) -> ReaderResult<()> {
        let name = options.port_name.as_str();
        info!(port = %name, baud = options.baud_rate, "Attempting to open port");

        if name.is_empty() {
            return Err(ReaderError::validation(name, ValidationReason::EmptyName));
        }

        let ports = self.backend.enumerate().map_err(ReaderError::Enumeration)?;
        if !ports.iter().any(|p| p == name) {
            return Err(ReaderError::validation(name, ValidationReason::NotFound));
        }

        let reservation = self.registry.reserve(name).ok_or_else(|| {
            if self.registry.is_sealed() {
                ReaderError::ShutDown {
                    port: name.to_string(),
                }
            } else {
                ReaderError::validation(name, ValidationReason::AlreadyOpen)
            }
        })?;

        let config = SessionConfig::new(name, options.baud_rate)
            .with_poll_interval(options.poll_interval)
            .with_tick(self.config.tick)
            .with_strip_terminators(
                options
                    .strip_terminators
                    .unwrap_or(self.config.strip_terminators),
            );

        Session::open(config, self.backend.as_ref(), handlers, reservation).map_err(|source| {
            ReaderError::PortOpen {
                port: name.to_string(),
                source,
            }
        })?;
        Ok(())
    }

    /// Stop reading `port_name`.
    ///
    /// Returns once polling has stopped, the device is released, the port is
    /// deregistered and the closed subscribers have run.
    pub async fn remove(&self, port_name: &str) -> ReaderResult<()> {
        info!(port = %port_name, "Attempting to close port");

        if port_name.is_empty() {
            return Err(ReaderError::validation(port_name, ValidationReason::EmptyName));
        }

        let session = self
            .registry
            .get(port_name)
            .ok_or_else(|| ReaderError::PortNotFound {
                port: port_name.to_string(),
            })?;

        close_session(&session).await
    }

    /// Whether a session is open for `port_name`.
    pub fn is_open(&self, port_name: &str) -> bool {
        self.registry.is_open(port_name)
    }

    /// Names of the open ports, sorted.
    pub fn open_ports(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn session_info(&self, port_name: &str) -> Option<SessionInfo> {
        self.registry.get(port_name).map(|session| session.info())
    }

    /// Send bytes to an open port.
    pub fn write(&self, port_name: &str, data: &[u8]) -> ReaderResult<usize> {
        let session = self
            .registry
            .get(port_name)
            .ok_or_else(|| ReaderError::PortNotFound {
                port: port_name.to_string(),
            })?;

        session.write(data).map_err(|source| match source {
            PortError::NotOpen => ReaderError::PortNotFound {
                port: port_name.to_string(),
            },
            source => ReaderError::Write {
                port: port_name.to_string(),
                source,
            },
        })
    }

    /// Ports the platform currently lists.
    pub fn available_ports(&self) -> ReaderResult<Vec<String>> {
        self.backend.enumerate().map_err(ReaderError::Enumeration)
    }

    /// The listed port with the greatest number under the configured prefix,
    /// or an empty string.
    pub fn highest_numbered_port(&self) -> ReaderResult<String> {
        let ports = self.available_ports()?;
        Ok(highest_numbered_port(&ports, &self.config.port_prefix))
    }

    /// Close every open session and stop accepting new ones.
    ///
    /// Opens still in progress are waited for and closed as well. Returns how
    /// many sessions were closed. Close failures are logged and the first one
    /// is returned after all sessions are down. Later `create` calls fail
    /// with [`ReaderError::ShutDown`].
    pub async fn shutdown(&self) -> ReaderResult<usize> {
        self.registry.seal();

        let mut closed = 0;
        let mut first_error = None;

        loop {
            let sessions = self.registry.sessions();
            if sessions.is_empty() && self.registry.pending() == 0 {
                break;
            }

            let mut waiting = sessions.is_empty();
            for session in sessions {
                match close_session(&session).await {
                    Ok(()) => closed += 1,
                    // Someone else is already closing it.
                    Err(ReaderError::PortNotFound { .. }) => waiting = true,
                    Err(e) => {
                        closed += 1;
                        warn!(port = %session.name(), error = %e, "Port did not close cleanly");
                        first_error.get_or_insert(e);
                    }
                }
            }

            if waiting {
                tokio::time::sleep(SHUTDOWN_RETRY).await;
            }
        }

        info!(closed, "Reader shut down");
        match first_error {
            Some(e) => Err(e),
            None => Ok(closed),
        }
    }
}

async fn close_session(session: &Session) -> ReaderResult<()> {
    session.close().await.map_err(|source| match source {
        PortError::NotOpen => ReaderError::PortNotFound {
            port: session.name().to_string(),
        },
        source => ReaderError::PortClose {
            port: session.name().to_string(),
            source,
        },
    })
}

impl Drop for SerialPortReader {
    fn drop(&mut self) {
        let sessions = self.registry.sessions();
        if sessions.is_empty() {
            return;
        }

        warn!(
            open = sessions.len(),
            "Reader dropped with open ports; stopping their polling without close notifications"
        );
        for session in sessions {
            session.request_stop();
        }
    }
}

impl std::fmt::Debug for SerialPortReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortReader")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}
