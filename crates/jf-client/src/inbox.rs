//! Inbox: a read/unread history of notifications seen by a client.
//!
//! The inbox is an ordinary listener: it records every dispatched
//! notification newest-first and tracks which ones have been read.

use std::collections::VecDeque;
use std::sync::Arc;

use jf_protocol::Notification;
use parking_lot::RwLock;

use crate::client::NotificationClient;
use crate::delivery::Delivery;
use crate::listener::Subscription;

#[derive(Debug, Clone, PartialEq)]
pub struct InboxEntry {
    pub notification: Notification,
    pub read: bool,
}

impl InboxEntry {
    /// The endpoint-assigned id when known, else the source id.
    pub fn key(&self) -> &str {
        self.notification
            .id
            .as_deref()
            .unwrap_or(&self.notification.source_id)
    }
}

/// Entries kept by [`Inbox::attach`].
pub const DEFAULT_INBOX_CAPACITY: usize = 100;

pub struct Inbox {
    capacity: usize,
    entries: Arc<RwLock<VecDeque<InboxEntry>>>,
    subscription: Subscription,
}

impl Inbox {
    /// Start recording notifications dispatched by `client`.
    pub fn attach<D: Delivery>(client: &NotificationClient<D>) -> Self {
        Self::with_capacity(client, DEFAULT_INBOX_CAPACITY)
    }

    /// Like [`Inbox::attach`], keeping at most `capacity` entries; the oldest
    /// is dropped first.
    pub fn with_capacity<D: Delivery>(client: &NotificationClient<D>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let entries: Arc<RwLock<VecDeque<InboxEntry>>> = Arc::new(RwLock::new(VecDeque::new()));
        let sink = entries.clone();
        let subscription = client.on_notification(move |notification| {
            let mut entries = sink.write();
            entries.push_front(InboxEntry {
                notification: notification.clone(),
                read: false,
            });
            entries.truncate(capacity);
        });
        Self {
            capacity,
            entries,
            subscription,
        }
    }

    /// Snapshot of all entries, newest first.
    pub fn notifications(&self) -> Vec<InboxEntry> {
        self.entries.read().iter().cloned().collect()
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

    pub fn unread_count(&self) -> usize {
        self.entries.read().iter().filter(|e| !e.read).count()
    }

    /// Mark every entry whose key matches as read. Returns whether any matched.
    pub fn mark_as_read(&self, key: &str) -> bool {
        let mut found = false;
        for entry in self.entries.write().iter_mut() {
            if entry.key() == key {
                entry.read = true;
                found = true;
            }
        }
        found
    }

    /// Returns how many entries changed from unread to read.
    pub fn mark_all_as_read(&self) -> usize {
        let mut changed = 0;
        for entry in self.entries.write().iter_mut().filter(|e| !e.read) {
            entry.read = true;
            changed += 1;
        }
        changed
    }

    /// Stop recording. Existing entries are kept.
    pub fn detach(&self) -> bool {
        self.subscription.unsubscribe()
    }
}
