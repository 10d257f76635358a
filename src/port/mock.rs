//! In-memory serial ports for tests and demos.
//!
//! [`MockPortBackend`] plays the platform serial layer: it has a list of
//! enumerable port names and hands out [`MockPortLine`] handles. Every
//! handle for a given name shares one state, so a test can keep a handle,
//! feed it data while a session polls the clone it opened, and later
//! inspect how often the device was opened and closed.

use super::error::PortError;
use super::traits::{PortBackend, PortConfiguration, PortLine};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// One scripted result of a `read_available` call.
#[derive(Debug, Clone)]
enum MockRead {
    Data(Vec<u8>),
    Error(std::io::ErrorKind),
}

#[derive(Debug, Default)]
struct MockLineState {
    /// Scripted reads, one entry consumed per poll.
    reads: VecDeque<MockRead>,
    /// Log of all bytes written to the port.
    write_log: Vec<Vec<u8>>,
    open: bool,
    open_count: usize,
    close_count: usize,
    read_calls: usize,
    last_baud: Option<u32>,
    fail_close: bool,
}

/// Mock serial line.
///
/// Each queued chunk is returned by exactly one `read_available` call, which
/// mirrors a device whose driver buffer is drained once per poll.
///
/// # Example
/// ```
/// use serial_port_reader::port::{MockPortLine, PortLine};
///
/// let mut line = MockPortLine::new("MOCK0");
/// line.push_read(b"Hello");
/// line.push_read(b"World");
///
/// assert_eq!(line.read_available().unwrap(), b"Hello");
/// assert_eq!(line.read_available().unwrap(), b"World");
/// assert!(line.read_available().unwrap().is_empty());
/// ```
#[derive(Clone)]
pub struct MockPortLine {
    name: String,
    state: Arc<Mutex<MockLineState>>,
}

impl MockPortLine {
    /// Create an open mock line with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockLineState {
                open: true,
                ..Default::default()
            })),
        }
    }

    /// Queue bytes to be returned by one future read.
    pub fn push_read(&self, data: &[u8]) {
        self.state
            .lock()
            .reads
            .push_back(MockRead::Data(data.to_vec()));
    }

    /// Queue a failing read.
    pub fn push_read_error(&self, kind: std::io::ErrorKind) {
        self.state.lock().reads.push_back(MockRead::Error(kind));
    }

    /// Number of scripted reads not consumed yet.
    pub fn pending_reads(&self) -> usize {
        self.state.lock().reads.len()
    }

    /// Number of `read_available` calls made so far.
    pub fn read_calls(&self) -> usize {
        self.state.lock().read_calls
    }

    /// Get a copy of all data written to the port.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// How many times the device was opened through a backend.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// How many times the device was successfully closed.
    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }

    /// Baud rate of the most recent open through a backend.
    pub fn last_baud(&self) -> Option<u32> {
        self.state.lock().last_baud
    }

    /// Make the next close report an I/O error (the handle is still released).
    pub fn set_fail_close(&self, fail: bool) {
        self.state.lock().fail_close = fail;
    }

    fn mark_opened(&self, baud_rate: u32) {
        let mut state = self.state.lock();
        state.open = true;
        state.open_count += 1;
        state.last_baud = Some(baud_rate);
    }
}

impl PortLine for MockPortLine {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn read_available(&mut self) -> Result<Vec<u8>, PortError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PortError::NotOpen);
        }
        state.read_calls += 1;

        match state.reads.pop_front() {
            Some(MockRead::Data(data)) => Ok(data),
            Some(MockRead::Error(kind)) => Err(PortError::Io(std::io::Error::new(
                kind,
                "scripted read failure",
            ))),
            None => Ok(Vec::new()),
        }
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PortError::NotOpen);
        }
        state.write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn close(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PortError::NotOpen);
        }
        state.open = false;
        state.close_count += 1;

        if std::mem::take(&mut state.fail_close) {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device vanished during close",
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MockPortLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPortLine")
            .field("name", &self.name)
            .field("pending_reads", &self.pending_reads())
            .finish()
    }
}

#[derive(Debug, Default)]
struct MockBackendState {
    ports: Vec<String>,
    lines: HashMap<String, MockPortLine>,
    open_failures: HashMap<String, String>,
    enumeration_failure: Option<String>,
}

/// Mock platform serial layer.
///
/// # Example
/// ```
/// use serial_port_reader::port::{MockPortBackend, PortBackend, PortConfiguration};
///
/// let backend = MockPortBackend::with_ports(["COM3", "COM5"]);
/// assert_eq!(backend.enumerate().unwrap(), vec!["COM3", "COM5"]);
///
/// let line = backend.line("COM5");
/// line.push_read(b"ok\r\n");
/// let mut opened = backend.open("COM5", &PortConfiguration::default()).unwrap();
/// assert_eq!(opened.read_available().unwrap(), b"ok\r\n");
/// assert_eq!(line.open_count(), 1);
/// ```
#[derive(Clone, Default)]
pub struct MockPortBackend {
    state: Arc<Mutex<MockBackendState>>,
}

impl MockPortBackend {
    /// Backend with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend enumerating the given port names.
    pub fn with_ports<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::new();
        backend.state.lock().ports = ports.into_iter().map(Into::into).collect();
        backend
    }

    /// Make a port appear in the enumeration.
    pub fn add_port(&self, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.state.lock();
        if !state.ports.contains(&name) {
            state.ports.push(name);
        }
    }

    /// Make a port disappear from the enumeration.
    pub fn remove_port(&self, name: &str) {
        self.state.lock().ports.retain(|p| p != name);
    }

    /// Shared handle to the device behind `name`.
    ///
    /// The handle exists whether or not the port is enumerated, so data can
    /// be queued before a session opens it.
    pub fn line(&self, name: &str) -> MockPortLine {
        self.state
            .lock()
            .lines
            .entry(name.to_string())
            .or_insert_with(|| {
                let line = MockPortLine::new(name);
                line.state.lock().open = false;
                line
            })
            .clone()
    }

    /// Make opening `name` fail with a configuration error carrying `message`.
    pub fn fail_open(&self, name: &str, message: impl Into<String>) {
        self.state
            .lock()
            .open_failures
            .insert(name.to_string(), message.into());
    }

    /// Let `name` open normally again.
    pub fn clear_open_failure(&self, name: &str) {
        self.state.lock().open_failures.remove(name);
    }

    /// Make enumeration fail.
    pub fn fail_enumeration(&self, message: Option<String>) {
        self.state.lock().enumeration_failure = message;
    }
}

impl PortBackend for MockPortBackend {
    fn enumerate(&self) -> Result<Vec<String>, PortError> {
        let state = self.state.lock();
        if let Some(message) = &state.enumeration_failure {
            return Err(PortError::Io(std::io::Error::other(message.clone())));
        }
        Ok(state.ports.clone())
    }

    fn open(
        &self,
        name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn PortLine>, PortError> {
        if let Some(message) = self.state.lock().open_failures.get(name) {
            return Err(PortError::config(message.clone()));
        }
        if config.baud_rate == 0 {
            return Err(PortError::config("baud rate must be positive"));
        }

        let line = self.line(name);
        if line.is_open() {
            // An OS-level owner already holds the device.
            return Err(PortError::Io(std::io::Error::other(format!(
                "{name} is busy"
            ))));
        }
        line.mark_opened(config.baud_rate);
        Ok(Box::new(line))
    }
}

impl std::fmt::Debug for MockPortBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPortBackend")
            .field("ports", &self.state.lock().ports)
            .finish()
    }
}
