//! Jay's Frames notification dispatch client.
//!
//! The client accepts notification submissions and buffers them while
//! disconnected. Once connected it fans each one out to in-process listeners
//! and forwards it, best effort, to the notification endpoint. A realtime
//! subscriber feeds notifications broadcast by the endpoint into the same
//! listeners.
//!
//! - `client`: lifecycle, pending queue, dispatch
//! - `listener`: ordered listener registry and unsubscribe handles
//! - `delivery`: the remote delivery seam and its reqwest implementation
//! - `inbox`: a listener-backed read/unread history
//! - `realtime`: the `/ws` subscriber with reconnect and polling fallback

pub mod client;
pub mod delivery;
pub mod inbox;
pub mod listener;
pub mod realtime;

pub use client::{
    ClientConfig, ClientError, ClientState, DispatchReport, NotificationClient, SendOutcome,
};
pub use delivery::{Delivery, DeliveryError, HttpDelivery, HttpDeliveryConfig};
pub use inbox::{DEFAULT_INBOX_CAPACITY, Inbox, InboxEntry};
pub use listener::{Listener, ListenerOutcome, Subscription};
pub use realtime::{RealtimeConfig, RealtimeMode, RealtimeSubscriber, backoff_delay};

pub use jf_protocol::{Notification, NotificationOptions, NotificationType};
