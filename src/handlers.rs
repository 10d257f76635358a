//! Subscriber lists for session notifications.
//!
//! Each notification (opened, data, closed) keeps an ordered list of
//! closures. Subscribers run synchronously in registration order on the
//! thread that raised the notification. A panicking subscriber is logged and
//! skipped so it cannot take the polling task down with it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::error;

type Notify = Box<dyn Fn() + Send + Sync>;
type DataNotify = Box<dyn Fn(&str) + Send + Sync>;

/// Callbacks attached to one session.
///
/// ```
/// use serial_port_reader::SessionHandlers;
///
/// let handlers = SessionHandlers::new()
///     .on_opened(|| println!("opened"))
///     .on_data(|chunk| println!("got {chunk}"))
///     .on_closed(|| println!("closed"));
/// assert_eq!(handlers.subscriber_count(), 3);
/// ```
#[derive(Default)]
pub struct SessionHandlers {
    opened: Vec<Notify>,
    data: Vec<DataNotify>,
    closed: Vec<Notify>,
}

impl SessionHandlers {
    /// Handlers with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the port being opened.
    pub fn on_opened(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.opened.push(Box::new(f));
        self
    }

    /// Subscribe to data chunks.
    pub fn on_data(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.data.push(Box::new(f));
        self
    }

    /// Subscribe to the port being closed.
    pub fn on_closed(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.closed.push(Box::new(f));
        self
    }

    /// Total number of subscribers across all notifications.
    pub fn subscriber_count(&self) -> usize {
        self.opened.len() + self.data.len() + self.closed.len()
    }

    pub(crate) fn notify_opened(&self, port: &str) {
        for f in &self.opened {
            guarded(port, "opened", || f());
        }
    }

    pub(crate) fn notify_data(&self, port: &str, chunk: &str) {
        for f in &self.data {
            guarded(port, "data", || f(chunk));
        }
    }

    pub(crate) fn notify_closed(&self, port: &str) {
        for f in &self.closed {
            guarded(port, "closed", || f());
        }
    }
}

impl std::fmt::Debug for SessionHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandlers")
            .field("opened", &self.opened.len())
            .field("data", &self.data.len())
            .field("closed", &self.closed.len())
            .finish()
    }
}

fn guarded(port: &str, event: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(port = %port, event, "Subscriber panicked; continuing");
    }
}
