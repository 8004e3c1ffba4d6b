//! Jay's Frames notification endpoint
//!
//! Receives notifications over HTTP and fans them out to realtime clients.
//! The endpoint handles:
//! - `POST /api/notifications` intake with payload validation
//! - `GET /api/notifications` recent history, and lookup by id
//! - `/ws` socket registration, ping/pong, `new_notification` events, and broadcast
//! - Heartbeat / stale connection detection
//!
//! Intake and broadcast share one channel, so everything accepted over REST
//! reaches every connected socket.

pub mod connection;
pub mod server;
pub mod store;

pub use connection::SocketConnection;
pub use server::{NotificationServer, ServerConfig, ServerError};
pub use store::NotificationStore;
