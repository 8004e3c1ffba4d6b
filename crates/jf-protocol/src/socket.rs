//! Messages exchanged over the `/ws` realtime socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::notification::Notification;

/// Envelope for every socket frame, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SocketMessage {
    /// Client → server: announce the application id.
    Register {
        #[serde(rename = "appId")]
        app_id: String,
    },
    /// Server → client: registration acknowledged.
    Registered {
        #[serde(rename = "appId")]
        app_id: String,
    },
    Ping,
    Pong,
    /// Server → client: a notification accepted by the endpoint.
    Notification { payload: Notification },
    /// Client → server: a named event. `new_notification` carries a
    /// notification payload to publish.
    Event {
        event: String,
        #[serde(default)]
        payload: Value,
    },
}

/// Event name that publishes its payload as a notification.
pub const NEW_NOTIFICATION_EVENT: &str = "new_notification";

impl SocketMessage {
    pub fn to_json(&self) -> String {
        // Every variant is a plain object, serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }
}
