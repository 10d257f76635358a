//! Table of live sessions keyed by port name.
//!
//! A name is claimed atomically with [`SessionRegistry::reserve`] before the
//! device is opened, so two concurrent `create` calls for the same port can
//! never both reach the device. The reservation turns into a registration
//! once the session is running, or disappears if opening fails.

use crate::session::Session;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

enum Slot {
    /// Open in progress; the name is taken but no session is visible yet.
    Reserved,
    Active(Arc<Session>),
}

/// Process-wide table of open sessions.
#[derive(Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<String, Slot>>,
    /// Set once on shutdown; no further names can be reserved.
    sealed: AtomicBool,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a running session is registered under `name`.
    pub fn is_open(&self, name: &str) -> bool {
        matches!(self.slots.lock().get(name), Some(Slot::Active(_)))
    }

    /// The session registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<Session>> {
        match self.slots.lock().get(name) {
            Some(Slot::Active(session)) => Some(Arc::clone(session)),
            _ => None,
        }
    }

    /// Register a session.
    ///
    /// Refused, handing the session back, when the name is already
    /// registered or reserved, or the registry is sealed.
    pub fn add(&self, session: Arc<Session>) -> Result<(), Arc<Session>> {
        let mut slots = self.slots.lock();
        if self.is_sealed() {
            return Err(session);
        }
        match slots.entry(session.name().to_string()) {
            Entry::Occupied(_) => Err(session),
            Entry::Vacant(slot) => {
                slot.insert(Slot::Active(session));
                Ok(())
            }
        }
    }

    /// Deregister `session`. Returns false if it was not registered.
    ///
    /// A different session registered under the same name is left alone.
    pub fn remove(&self, session: &Session) -> bool {
        let mut slots = self.slots.lock();
        let registered = matches!(
            slots.get(session.name()),
            Some(Slot::Active(current)) if std::ptr::eq(Arc::as_ptr(current), session)
        );
        if registered {
            slots.remove(session.name());
        }
        registered
    }

    /// Claim `name` for a session about to be opened.
    ///
    /// Returns `None` if the name is registered, already being opened, or
    /// the registry is sealed.
    pub fn reserve(self: &Arc<Self>, name: &str) -> Option<Reservation> {
        let mut slots = self.slots.lock();
        // Checked under the lock so seal() and pending() see a consistent table.
        if self.is_sealed() {
            return None;
        }
        match slots.entry(name.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Slot::Reserved);
                Some(Reservation {
                    registry: Arc::clone(self),
                    name: name.to_string(),
                    armed: true,
                })
            }
        }
    }

    /// Refuse all further reservations. Opens already in progress still
    /// complete and register.
    pub fn seal(&self) {
        let _slots = self.slots.lock();
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Number of names reserved by opens that have not finished yet.
    pub fn pending(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Reserved))
            .count()
    }

    /// Names of all registered sessions, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Active(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// All registered sessions.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.slots
            .lock()
            .values()
            .filter_map(|slot| match slot {
                Slot::Active(session) => Some(Arc::clone(session)),
                Slot::Reserved => None,
            })
            .collect()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Active(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("open", &self.names())
            .finish()
    }
}

/// A claimed port name. Released on drop unless activated.
#[must_use = "dropping a reservation releases the port name"]
pub struct Reservation {
    registry: Arc<SessionRegistry>,
    name: String,
    armed: bool,
}

impl Reservation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Replace the reservation with the running session.
    pub(crate) fn activate(mut self, session: Arc<Session>) {
        debug_assert_eq!(session.name(), self.name);
        self.registry
            .slots
            .lock()
            .insert(self.name.clone(), Slot::Active(session));
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut slots = self.registry.slots.lock();
        if matches!(slots.get(&self.name), Some(Slot::Reserved)) {
            slots.remove(&self.name);
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("name", &self.name)
            .field("armed", &self.armed)
            .finish()
    }
}
