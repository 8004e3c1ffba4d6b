//! Jay's Frames notification protocol types.
//!
//! This crate is the single source of truth for the notification record,
//! its option bag, the socket message envelope, route paths, and protocol
//! errors. Both the dispatch client and the receiving endpoint build on it.

pub mod error;
pub mod notification;
pub mod routes;
pub mod socket;

pub use error::ProtocolError;
pub use notification::{
    Notification, NotificationOptions, NotificationPayload, NotificationType, DEFAULT_SOURCE,
};
pub use routes::{Headers, Routes};
pub use socket::{NEW_NOTIFICATION_EVENT, SocketMessage};
