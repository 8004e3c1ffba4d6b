//! Socket connection state tracking.

use std::time::Instant;

/// A connected realtime client.
#[derive(Debug)]
pub struct SocketConnection {
    /// Unique connection ID
    pub id: String,
    /// When the client connected
    pub connected_at: Instant,
    /// Application id announced via `register`
    pub app_id: Option<String>,
    /// Cleared on each heartbeat tick, set again by any inbound frame
    pub alive: bool,
}

impl SocketConnection {
    pub fn new(id: String) -> Self {
        Self {
            id,
            connected_at: Instant::now(),
            app_id: None,
            alive: true,
        }
    }

    pub fn register(&mut self, app_id: String) {
        self.app_id = Some(app_id);
    }

    pub fn is_registered(&self) -> bool {
        self.app_id.is_some()
    }

    pub fn touch(&mut self) {
        self.alive = true;
    }
}
