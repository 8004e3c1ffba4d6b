//! Route paths and header names shared by the client and the endpoint.

/// HTTP routes exposed by the notification endpoint.
pub struct Routes;

impl Routes {
    // ── REST ────────────────────────────────────────────────────────────
    pub const NOTIFICATIONS: &str = "/api/notifications";

    // ── Realtime ────────────────────────────────────────────────────────
    pub const SOCKET: &str = "/ws";

    // ── Diagnostics ─────────────────────────────────────────────────────
    pub const HEALTH: &str = "/health";
}

/// Request headers understood by the endpoint.
pub struct Headers;

impl Headers {
    pub const API_KEY: &str = "X-API-Key";
    pub const APP_ID: &str = "X-App-ID";
}
