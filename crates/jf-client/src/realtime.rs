//! Realtime receive path: the `/ws` subscriber with reconnect and polling
//! fallback.
//!
//! The subscriber connects to the endpoint socket, registers its app id and
//! hands every broadcast notification to the client's listeners. When the
//! socket closes it reconnects with exponential backoff. After
//! `max_attempts` consecutive failures it switches to polling
//! `GET /api/notifications`, skipping ids it has already delivered.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jf_protocol::{Headers, Notification, Routes, SocketMessage};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::client::NotificationClient;
use crate::delivery::{Delivery, DeliveryError, generate_app_id};
use crate::listener::FanOut;

/// Realtime subscriber configuration.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Origin of the endpoint, e.g. `http://127.0.0.1:3000`
    pub base_url: String,
    /// Announced in the `register` frame and sent as `X-App-ID`
    pub app_id: String,
    /// Sent as `X-API-Key` on polling requests when present
    pub api_key: Option<String>,
    /// Consecutive socket failures before falling back to polling
    pub max_attempts: u32,
    /// Base reconnect delay; attempt `n` waits `unit * (2^n - 1)`
    pub backoff_unit: Duration,
    /// Upper bound on a single reconnect delay
    pub backoff_cap: Duration,
    pub poll_interval: Duration,
    /// Delivered ids remembered for de-duplication
    pub seen_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".into(),
            app_id: generate_app_id(),
            api_key: None,
            max_attempts: 5,
            backoff_unit: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
            seen_capacity: 1024,
        }
    }
}

impl RealtimeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// `ws://` / `wss://` URL of the socket route.
    pub fn socket_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}{}", Routes::SOCKET)
    }

    fn poll_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), Routes::NOTIFICATIONS)
    }
}

/// Delay before reconnect attempt `attempt` (1-based): `unit * (2^attempt - 1)`,
/// capped at `cap`.
pub fn backoff_delay(attempt: u32, unit: Duration, cap: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).map_or(u32::MAX, |p| p - 1);
    unit.checked_mul(factor).map_or(cap, |d| d.min(cap))
}

/// Where the subscriber currently gets notifications from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeMode {
    Connecting,
    Socket,
    Polling,
    Stopped,
}

/// Background task feeding remote notifications into a client's listeners.
pub struct RealtimeSubscriber {
    mode: Arc<Mutex<RealtimeMode>>,
    app_id: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl RealtimeSubscriber {
    /// Start receiving for `client`. Must be called within a tokio runtime.
    pub fn spawn<D: Delivery>(
        client: &NotificationClient<D>,
        config: RealtimeConfig,
    ) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| DeliveryError::Setup(e.to_string()))?;

        let mode = Arc::new(Mutex::new(RealtimeMode::Connecting));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let app_id = config.app_id.clone();

        let task = Task {
            seen: SeenIds::new(config.seen_capacity),
            config,
            fan_out: client.fan_out_handle(),
            http,
            mode: mode.clone(),
            shutdown_rx,
        };
        let handle = tokio::spawn(task.run());

        Ok(Self {
            mode,
            app_id,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn mode(&self) -> RealtimeMode {
        *self.mode.lock()
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Close the socket or stop polling, and wait for the task to end.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        *self.mode.lock() = RealtimeMode::Stopped;
        info!("Realtime subscriber stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Background task
// ─────────────────────────────────────────────────────────────────────────────

enum SocketExit {
    Closed,
    Shutdown,
}

struct Task {
    config: RealtimeConfig,
    fan_out: FanOut,
    http: reqwest::Client,
    mode: Arc<Mutex<RealtimeMode>>,
    shutdown_rx: mpsc::Receiver<()>,
    seen: SeenIds,
}

impl Task {
    async fn run(mut self) {
        let url = self.config.socket_url();
        let max_attempts = self.config.max_attempts.max(1);
        let mut failures = 0u32;

        loop {
            self.set_mode(RealtimeMode::Connecting);
            info!("Connecting to {url}");
            match connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    info!("WebSocket connection established");
                    failures = 0;
                    self.set_mode(RealtimeMode::Socket);
                    if let SocketExit::Shutdown = self.run_socket(ws).await {
                        return;
                    }
                    info!("WebSocket connection closed");
                }
                Err(e) => warn!("WebSocket connection to {url} failed: {e}"),
            }

            failures += 1;
            if failures >= max_attempts {
                break;
            }
            let delay = backoff_delay(failures, self.config.backoff_unit, self.config.backoff_cap);
            info!("Reconnecting in {delay:?} (attempt {failures} of {max_attempts})");
            tokio::select! {
                _ = self.shutdown_rx.recv() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Max reconnection attempts reached, falling back to polling");
        self.set_mode(RealtimeMode::Polling);
        let mut ticker = tokio::time::interval(self.config.poll_interval.max(Duration::from_millis(1)));
        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => return,
                _ = ticker.tick() => self.poll().await,
            }
        }
    }

    async fn run_socket(
        &mut self,
        ws: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    ) -> SocketExit {
        let (mut ws_tx, mut ws_rx) = ws.split();

        let register = SocketMessage::Register {
            app_id: self.config.app_id.clone(),
        };
        if let Err(e) = ws_tx.send(Message::Text(register.to_json().into())).await {
            warn!("Failed to register with server: {e}");
            return SocketExit::Closed;
        }

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return SocketExit::Shutdown;
                }

                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = self.handle_frame(&text) {
                                if let Err(e) = ws_tx.send(Message::Text(reply.into())).await {
                                    warn!("Failed to reply to server: {e}");
                                    return SocketExit::Closed;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => return SocketExit::Closed,
                        Some(Err(e)) => {
                            warn!("WebSocket error: {e}");
                            return SocketExit::Closed;
                        }
                        // Control frames are answered by tungstenite
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    fn handle_frame(&mut self, text: &str) -> Option<String> {
        let message: SocketMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("Error parsing message: {e}");
                return None;
            }
        };

        match message {
            SocketMessage::Notification { payload } => {
                self.deliver(&payload);
                None
            }
            SocketMessage::Ping => Some(SocketMessage::Pong.to_json()),
            SocketMessage::Registered { app_id } => {
                info!("Registered with server as {app_id}");
                None
            }
            other => {
                debug!("Ignoring server message: {other:?}");
                None
            }
        }
    }

    async fn poll(&mut self) {
        let mut request = self.http.get(self.config.poll_url());
        if let Some(ref key) = self.config.api_key {
            request = request
                .header(Headers::API_KEY, key)
                .header(Headers::APP_ID, &self.config.app_id);
        }

        let body: Value = match request.send().await.and_then(|r| r.error_for_status()) {
            Ok(response) => match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Error polling for notifications: {e}");
                    return;
                }
            },
            Err(e) => {
                warn!("Error polling for notifications: {e}");
                return;
            }
        };

        // Newest first on the wire; deliver oldest first.
        for notification in polled_notifications(body).into_iter().rev() {
            self.deliver(&notification);
        }
    }

    fn deliver(&mut self, notification: &Notification) {
        if let Some(ref id) = notification.id {
            if !self.seen.insert(id) {
                debug!("Skipping already delivered notification {id}");
                return;
            }
        }
        self.fan_out.run(notification);
    }

    fn set_mode(&self, mode: RealtimeMode) {
        *self.mode.lock() = mode;
    }
}

/// Accepts `{"notifications": [...]}` or a bare array. Entries that do not
/// decode are skipped.
fn polled_notifications(body: Value) -> Vec<Notification> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("notifications") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("Skipping malformed polled notification: {e}");
                None
            }
        })
        .collect()
}

/// Bounded set of delivered ids, forgetting the oldest first.
struct SeenIds {
    capacity: usize,
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ids: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns `false` if the id was already present.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }
}
