//! Ordered listener registry with per-listener fault isolation.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use jf_protocol::Notification;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error};

/// Callback invoked synchronously for every dispatched notification.
pub type Listener = Arc<dyn Fn(&Notification) + Send + Sync>;

/// What happened when a single listener was invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerOutcome {
    Delivered,
    /// The listener panicked; the payload message is kept when it is a string.
    Panicked(String),
}

impl ListenerOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

pub(crate) struct ListenerRegistry {
    entries: RwLock<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    pub(crate) fn register(self: &Arc<Self>, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let total = {
            let mut entries = self.entries.write();
            entries.push((id, listener));
            entries.len()
        };
        debug!("Notification listener registered (total: {total})");
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) -> bool {
        let (removed, total) = {
            let mut entries = self.entries.write();
            let before = entries.len();
            if let Some(pos) = entries.iter().position(|(entry_id, _)| *entry_id == id) {
                entries.remove(pos);
            }
            (entries.len() < before, entries.len())
        };
        if removed {
            debug!("Notification listener unregistered (total: {total})");
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn clear(&self) {
        self.entries.write().clear();
    }

    /// Invoke every listener in registration order.
    ///
    /// Listeners run outside the registry lock, so a listener may unsubscribe
    /// itself or register another one; such changes apply from the next
    /// notification on.
    pub(crate) fn fan_out(&self, notification: &Notification) -> Vec<ListenerOutcome> {
        let snapshot: Vec<Listener> = self
            .entries
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        snapshot
            .iter()
            .map(|listener| match catch_unwind(AssertUnwindSafe(|| listener(notification))) {
                Ok(()) => ListenerOutcome::Delivered,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("Error in notification listener: {message}");
                    ListenerOutcome::Panicked(message)
                }
            })
            .collect()
    }
}

/// Shared handle for fanning out notifications that did not originate in
/// `send_notification`, such as ones received over the realtime socket.
#[derive(Clone)]
pub(crate) struct FanOut {
    pub(crate) registry: Arc<ListenerRegistry>,
    pub(crate) gate: Arc<Mutex<()>>,
}

impl FanOut {
    pub(crate) fn run(&self, notification: &Notification) -> Vec<ListenerOutcome> {
        let _gate = self.gate.lock();
        self.registry.fan_out(notification)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}

/// Handle returned by registration; removes exactly that listener.
///
/// Dropping the handle leaves the listener registered.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the listener. Returns `false` if it was already gone, which
    /// makes repeated calls harmless.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }
}
