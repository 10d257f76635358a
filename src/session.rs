//! One active read loop bound to one serial port.
//!
//! A [`Session`] owns its [`PortLine`] and a Tokio task that polls it. The
//! task reads whatever the device has buffered, hands the decoded chunk to
//! the data subscribers and sleeps for the poll interval. Closing is
//! cooperative: the running flag is cleared, the sleep is interrupted, and
//! [`Session::close`] waits for the task to finish before it releases the
//! device, deregisters, and notifies the closed subscribers.
//!
//! Per session the notification order is always
//! opened → data (in read order) → closed.

use crate::chunk::decode_chunk;
use crate::handlers::SessionHandlers;
use crate::port::{PortBackend, PortConfiguration, PortError, PortLine};
use crate::registry::{Reservation, SessionRegistry};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Scheduler tick used when a session polls "every tick".
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

/// How a session talks to its port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub port_name: String,
    pub baud_rate: u32,
    /// Delay between polls. Zero polls once per scheduler tick.
    pub poll_interval: Duration,
    /// Length of one scheduler tick. Zero yields to the runtime instead.
    pub tick: Duration,
    /// Remove `\r` and `\n` from delivered chunks.
    pub strip_terminators: bool,
}

impl SessionConfig {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            poll_interval: Duration::ZERO,
            tick: DEFAULT_TICK,
            strip_terminators: true,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_strip_terminators(mut self, strip: bool) -> Self {
        self.strip_terminators = strip;
        self
    }

    /// Device parameters derived from this configuration.
    pub fn port_configuration(&self) -> PortConfiguration {
        PortConfiguration::with_baud(self.baud_rate)
    }

    /// The pause taken after each poll.
    ///
    /// A positive interval waits that long; a zero interval waits one tick.
    fn suspension(&self) -> Suspension {
        let delay = if self.poll_interval.is_zero() {
            self.tick
        } else {
            self.poll_interval
        };

        if delay.is_zero() {
            Suspension::Yield
        } else {
            Suspension::Sleep(delay)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suspension {
    Sleep(Duration),
    Yield,
}

#[derive(Debug, Default)]
struct SessionStats {
    bytes_read: AtomicU64,
    chunks_delivered: AtomicU64,
    read_errors: AtomicU64,
    /// Consecutive failed reads; only the first of a streak is a warning.
    error_streak: AtomicU32,
}

/// Snapshot of a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub port_name: String,
    pub baud_rate: u32,
    pub poll_interval_ms: u64,
    pub opened_at: DateTime<Utc>,
    pub bytes_read: u64,
    pub chunks_delivered: u64,
    pub read_errors: u64,
}

/// An open port and its polling task.
pub struct Session {
    config: SessionConfig,
    line: Mutex<Box<dyn PortLine>>,
    handlers: SessionHandlers,
    running: AtomicBool,
    closing: AtomicBool,
    wake: Notify,
    stats: SessionStats,
    opened_at: DateTime<Utc>,
    task: Mutex<Option<JoinHandle<()>>>,
    registry: Weak<SessionRegistry>,
}

impl Session {
    /// Open the device, register under the reserved name, notify the opened
    /// subscribers and start polling, in that order.
    ///
    /// Opened subscribers already see the port as open. On failure nothing
    /// is registered: the reservation is released and the platform error is
    /// returned unchanged.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(
        config: SessionConfig,
        backend: &dyn PortBackend,
        handlers: SessionHandlers,
        reservation: Reservation,
    ) -> Result<Arc<Self>, PortError> {
        debug_assert_eq!(reservation.name(), config.port_name);
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PortError::config(format!("no async runtime to poll on: {e}")))?;

        let line = backend.open(&config.port_name, &config.port_configuration())?;

        let session = Arc::new(Self {
            line: Mutex::new(line),
            handlers,
            running: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            wake: Notify::new(),
            stats: SessionStats::default(),
            opened_at: Utc::now(),
            task: Mutex::new(None),
            registry: Arc::downgrade(reservation.registry()),
            config,
        });

        info!(
            port = %session.name(),
            baud = session.config.baud_rate,
            interval_ms = session.config.poll_interval.as_millis() as u64,
            "Port opened"
        );
        {
            // Held until the handle is stored: a close racing this open waits
            // here, so it always finds the task and runs after the opened
            // notification.
            let mut task = session.task.lock();
            reservation.activate(Arc::clone(&session));
            session.handlers.notify_opened(session.name());
            *task = Some(runtime.spawn(poll_loop(Arc::clone(&session))));
        }
        Ok(session)
    }

    pub fn name(&self) -> &str {
        &self.config.port_name
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the polling task has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            port_name: self.config.port_name.clone(),
            baud_rate: self.config.baud_rate,
            poll_interval_ms: self.config.poll_interval.as_millis() as u64,
            opened_at: self.opened_at,
            bytes_read: self.stats.bytes_read.load(Ordering::Relaxed),
            chunks_delivered: self.stats.chunks_delivered.load(Ordering::Relaxed),
            read_errors: self.stats.read_errors.load(Ordering::Relaxed),
        }
    }

    /// Write bytes to the device.
    pub fn write(&self, data: &[u8]) -> Result<usize, PortError> {
        if self.closing.load(Ordering::Acquire) {
            return Err(PortError::NotOpen);
        }
        self.line.lock().write_bytes(data)
    }

    /// Stop polling, release the device, deregister and notify.
    ///
    /// Only the first call does anything; later calls return
    /// [`PortError::NotOpen`]. When releasing the device fails, the session
    /// is still deregistered and the closed subscribers still run; the
    /// error is returned afterwards.
    pub async fn close(&self) -> Result<(), PortError> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Err(PortError::NotOpen);
        }
        self.request_stop();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(port = %self.name(), error = %e, "Polling task ended abnormally");
            }
        }

        let released = self.line.lock().close();
        if let Err(e) = &released {
            warn!(port = %self.name(), error = %e, "Closing port reported an error");
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self);
        }
        self.handlers.notify_closed(self.name());
        info!(port = %self.name(), "Port closed");

        released
    }

    /// Ask the polling task to stop without waiting for it.
    pub(crate) fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    /// One iteration of the read loop.
    fn poll_once(&self) {
        let read = {
            let mut line = self.line.lock();
            if !line.is_open() {
                return;
            }
            line.read_available()
        };

        match read {
            Ok(raw) if raw.is_empty() => {
                self.stats.error_streak.store(0, Ordering::Relaxed);
            }
            Ok(raw) => {
                self.stats.error_streak.store(0, Ordering::Relaxed);
                self.stats
                    .bytes_read
                    .fetch_add(raw.len() as u64, Ordering::Relaxed);

                match decode_chunk(&raw, self.config.strip_terminators) {
                    Some(chunk) => {
                        self.stats.chunks_delivered.fetch_add(1, Ordering::Relaxed);
                        debug!(port = %self.name(), bytes = raw.len(), "Chunk received");
                        self.handlers.notify_data(self.name(), &chunk);
                    }
                    None => trace!(port = %self.name(), "Only line terminators received"),
                }
            }
            Err(e) if e.is_transient() => {
                trace!(port = %self.name(), error = %e, "No data this tick");
            }
            Err(e) => {
                self.stats.read_errors.fetch_add(1, Ordering::Relaxed);
                if self.stats.error_streak.fetch_add(1, Ordering::Relaxed) == 0 {
                    warn!(port = %self.name(), error = %e, "Read failed; skipping tick");
                } else {
                    debug!(port = %self.name(), error = %e, "Read failed again; skipping tick");
                }
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("handlers", &self.handlers)
            .finish()
    }
}

async fn poll_loop(session: Arc<Session>) {
    let suspension = session.config.suspension();
    debug!(port = %session.name(), ?suspension, "Polling started");

    while session.is_running() {
        session.poll_once();
        if !session.is_running() {
            break;
        }

        match suspension {
            Suspension::Sleep(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = session.wake.notified() => {}
                }
            }
            Suspension::Yield => tokio::task::yield_now().await,
        }
    }

    debug!(port = %session.name(), "Polling stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MockPortBackend;
    use pretty_assertions::assert_eq;

    fn reserve(name: &str) -> (Arc<SessionRegistry>, Reservation) {
        let registry = Arc::new(SessionRegistry::new());
        let reservation = registry.reserve(name).unwrap();
        (registry, reservation)
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, SessionHandlers) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let (opened, data, closed) = (events.clone(), events.clone(), events.clone());
        let handlers = SessionHandlers::new()
            .on_opened(move || opened.lock().push("opened".to_string()))
            .on_data(move |chunk| data.lock().push(format!("data:{chunk}")))
            .on_closed(move || closed.lock().push("closed".to_string()));
        (events, handlers)
    }

    #[test]
    fn test_positive_interval_waits_that_long() {
        let config = SessionConfig::new("COM1", 9600).with_poll_interval(Duration::from_millis(250));
        assert_eq!(config.suspension(), Suspension::Sleep(Duration::from_millis(250)));
    }

    #[test]
    fn test_zero_interval_waits_one_tick() {
        let config = SessionConfig::new("COM1", 9600).with_tick(Duration::from_millis(5));
        assert_eq!(config.suspension(), Suspension::Sleep(Duration::from_millis(5)));

        let config = config.with_tick(Duration::ZERO);
        assert_eq!(config.suspension(), Suspension::Yield);
    }

    #[test]
    fn test_open_outside_runtime_fails_without_registering() {
        let backend = MockPortBackend::with_ports(["COM1"]);
        let (registry, reservation) = reserve("COM1");

        let result = Session::open(SessionConfig::new("COM1", 9600), &backend, SessionHandlers::new(), reservation);
        assert!(matches!(result, Err(PortError::Config(_))));
        assert!(registry.reserve("COM1").is_some());
        assert_eq!(backend.line("COM1").open_count(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_releases_reservation() {
        let backend = MockPortBackend::with_ports(["COM1"]);
        backend.fail_open("COM1", "access denied");
        let (registry, reservation) = reserve("COM1");

        let err = Session::open(SessionConfig::new("COM1", 9600), &backend, SessionHandlers::new(), reservation)
            .unwrap_err();
        assert!(err.to_string().contains("access denied"));
        assert!(registry.is_empty());
        assert!(registry.reserve("COM1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_notification_order() {
        let backend = MockPortBackend::with_ports(["COM1"]);
        let line = backend.line("COM1");
        line.push_read(b"first\r\n");
        line.push_read(b"second\n");
        let (events, handlers) = recorder();
        let (registry, reservation) = reserve("COM1");

        let config = SessionConfig::new("COM1", 9600).with_poll_interval(Duration::from_millis(10));
        let session = Session::open(config, &backend, handlers, reservation).unwrap();
        assert_eq!(events.lock().first().map(String::as_str), Some("opened"));

        tokio::time::sleep(Duration::from_millis(50)).await;
        session.close().await.unwrap();

        assert_eq!(
            *events.lock(),
            vec!["opened", "data:first", "data:second", "closed"]
        );
        assert!(!registry.is_open("COM1"));
        assert!(!line.is_open());
        assert_eq!(line.close_count(), 1);
    }

    #[tokio::test]
    async fn test_registered_before_opened_subscribers_run() {
        let backend = MockPortBackend::with_ports(["COM1"]);
        let (registry, reservation) = reserve("COM1");
        let seen = Arc::new(Mutex::new(None));

        let (observer, slot) = (Arc::clone(&registry), Arc::clone(&seen));
        let handlers = SessionHandlers::new().on_opened(move || {
            *slot.lock() = Some(observer.is_open("COM1"));
        });
        let session = Session::open(SessionConfig::new("COM1", 9600), &backend, handlers, reservation).unwrap();

        assert_eq!(*seen.lock(), Some(true));
        session.close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_remove_requested_from_opened_subscriber() {
        let backend = MockPortBackend::with_ports(["COM1"]);
        let (registry, reservation) = reserve("COM1");
        let (events, handlers) = recorder();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let done_tx = Mutex::new(Some(done_tx));

        let observer = Arc::clone(&registry);
        let handlers = handlers.on_opened(move || {
            let Some(session) = observer.get("COM1") else { return };
            let done = done_tx.lock().take();
            tokio::spawn(async move {
                let result = session.close().await;
                if let Some(done) = done {
                    let _ = done.send(result.is_ok());
                }
            });
        });
        let _session = Session::open(SessionConfig::new("COM1", 9600), &backend, handlers, reservation).unwrap();

        assert!(done_rx.await.unwrap(), "the opened session was found and closed");
        assert!(!registry.is_open("COM1"));
        assert_eq!(events.lock().first().map(String::as_str), Some("opened"));
        assert_eq!(events.lock().last().map(String::as_str), Some("closed"));
        assert_eq!(backend.line("COM1").close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_close_is_rejected() {
        let backend = MockPortBackend::with_ports(["COM1"]);
        let (events, handlers) = recorder();
        let (_registry, reservation) = reserve("COM1");
        let session = Session::open(SessionConfig::new("COM1", 9600), &backend, handlers, reservation).unwrap();

        session.close().await.unwrap();
        assert!(matches!(session.close().await, Err(PortError::NotOpen)));
        assert_eq!(events.lock().iter().filter(|e| *e == "closed").count(), 1);
        assert_eq!(backend.line("COM1").close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_interrupts_long_sleep() {
        let backend = MockPortBackend::with_ports(["COM1"]);
        let (_registry, reservation) = reserve("COM1");
        let config = SessionConfig::new("COM1", 9600).with_poll_interval(Duration::from_secs(3600));
        let session = Session::open(config, &backend, SessionHandlers::new(), reservation).unwrap();
        tokio::task::yield_now().await;

        let started = tokio::time::Instant::now();
        session.close().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!session.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_errors_are_skipped_and_counted() {
        let backend = MockPortBackend::with_ports(["COM1"]);
        let line = backend.line("COM1");
        line.push_read_error(std::io::ErrorKind::BrokenPipe);
        line.push_read_error(std::io::ErrorKind::TimedOut);
        line.push_read(b"after");
        let (events, handlers) = recorder();
        let (_registry, reservation) = reserve("COM1");

        let config = SessionConfig::new("COM1", 9600).with_poll_interval(Duration::from_millis(1));
        let session = Session::open(config, &backend, handlers, reservation).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let info = session.info();
        assert_eq!(info.read_errors, 1, "timeouts are not failures");
        assert_eq!(info.chunks_delivered, 1);
        assert_eq!(info.bytes_read, 5);
        session.close().await.unwrap();
        assert!(events.lock().contains(&"data:after".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_error_still_tears_down() {
        let backend = MockPortBackend::with_ports(["COM1"]);
        let (events, handlers) = recorder();
        let (registry, reservation) = reserve("COM1");
        let session = Session::open(SessionConfig::new("COM1", 9600), &backend, handlers, reservation).unwrap();

        backend.line("COM1").set_fail_close(true);
        assert!(session.close().await.is_err());
        assert!(!registry.is_open("COM1"));
        assert_eq!(events.lock().last().map(String::as_str), Some("closed"));
    }

    #[tokio::test]
    async fn test_write_goes_to_line() {
        let backend = MockPortBackend::with_ports(["COM1"]);
        let (_registry, reservation) = reserve("COM1");
        let session = Session::open(SessionConfig::new("COM1", 9600), &backend, SessionHandlers::new(), reservation).unwrap();

        assert_eq!(session.write(b"PING\r\n").unwrap(), 6);
        assert_eq!(backend.line("COM1").write_log(), vec![b"PING\r\n".to_vec()]);

        session.close().await.unwrap();
        assert!(matches!(session.write(b"x"), Err(PortError::NotOpen)));
    }
}
