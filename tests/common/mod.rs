//! Shared test utilities for reader integration tests.
//!
//! - [`Recorder`] collects every notification a session raises, in order
//! - [`reader_with_ports`] builds a reader over an in-memory backend

#![allow(dead_code)]

use parking_lot::Mutex;
use serial_port_reader::port::MockPortBackend;
use serial_port_reader::{ReaderConfig, SerialPortReader, SessionHandlers};
use std::sync::Arc;
use std::time::Duration;

/// A notification as seen by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Opened,
    Data(String),
    Closed,
}

/// Records notifications from any number of sessions.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers feeding this recorder.
    pub fn handlers(&self) -> SessionHandlers {
        let (opened, data, closed) = (self.clone(), self.clone(), self.clone());
        SessionHandlers::new()
            .on_opened(move || opened.events.lock().push(Event::Opened))
            .on_data(move |chunk| data.events.lock().push(Event::Data(chunk.to_string())))
            .on_closed(move || closed.events.lock().push(Event::Closed))
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn chunks(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Data(chunk) => Some(chunk.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }
}

/// Reader over a mock backend listing `ports`, with a 1 ms tick so
/// zero-interval sessions poll quickly. Port numbering uses the `COM` prefix
/// on every host.
pub fn reader_with_ports(ports: &[&str]) -> (SerialPortReader, MockPortBackend) {
    let backend = MockPortBackend::with_ports(ports.iter().copied());
    let config = ReaderConfig {
        tick: Duration::from_millis(1),
        port_prefix: "COM".to_string(),
        ..ReaderConfig::default()
    };
    (SerialPortReader::new(backend.clone(), config), backend)
}

/// Let the polling tasks run for `ms` of (possibly paused) time.
pub async fn run_for(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
