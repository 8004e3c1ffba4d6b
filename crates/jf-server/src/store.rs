//! Bounded, newest-first history of accepted notifications.

use std::collections::VecDeque;

use jf_protocol::Notification;
use parking_lot::RwLock;

pub struct NotificationStore {
    capacity: usize,
    entries: RwLock<VecDeque<Notification>>,
}

impl NotificationStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    /// Record a notification, evicting the oldest beyond capacity.
    pub fn push(&self, notification: Notification) {
        let mut entries = self.entries.write();
        entries.push_front(notification);
        entries.truncate(self.capacity);
    }

    pub fn recent(&self) -> Vec<Notification> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.entries
            .read()
            .iter()
            .find(|n| n.id.as_deref() == Some(id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
