//! Notification endpoint using Axum.
//!
//! Handles REST intake and history, HTTP upgrade to WebSocket, heartbeat
//! pings, and broadcast of accepted notifications to every socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        rejection::JsonRejection,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use jf_protocol::{
    NEW_NOTIFICATION_EVENT, Notification, NotificationPayload, ProtocolError, Routes, SocketMessage,
};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::connection::SocketConnection;
use crate::store::NotificationStore;

const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Endpoint configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Enable permissive CORS
    pub enable_cors: bool,
    /// Maximum concurrent sockets
    pub max_connections: Option<usize>,
    /// Notifications kept for `GET /api/notifications`
    pub history_capacity: usize,
    /// Source recorded when a payload omits one
    pub default_source: String,
    /// Interval between socket liveness pings
    pub heartbeat_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            hostname: "127.0.0.1".into(),
            enable_cors: false,
            max_connections: Some(64),
            history_capacity: 100,
            default_source: "api".into(),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid listen address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared state for the endpoint.
struct AppState {
    config: ServerConfig,
    /// Broadcast channel for accepted notifications (server → all sockets)
    notification_tx: broadcast::Sender<String>,
    store: Arc<NotificationStore>,
    /// Connected socket count (for health check)
    client_count: AtomicUsize,
}

/// The notification endpoint: owns the listener task and the broadcast channel.
pub struct NotificationServer {
    notification_tx: broadcast::Sender<String>,
    store: Arc<NotificationStore>,
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl NotificationServer {
    pub async fn start(mut config: ServerConfig) -> Result<Self, ServerError> {
        // A zero period would panic in `tokio::time::interval`.
        config.heartbeat_interval = config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);

        let (notification_tx, _) = broadcast::channel(1024);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let store = Arc::new(NotificationStore::new(config.history_capacity));

        let state = Arc::new(AppState {
            config: config.clone(),
            notification_tx: notification_tx.clone(),
            store: store.clone(),
            client_count: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route(
                Routes::NOTIFICATIONS,
                get(list_notifications_handler).post(create_notification_handler),
            )
            .route(
                &format!("{}/{{id}}", Routes::NOTIFICATIONS),
                get(get_notification_handler),
            )
            .route(Routes::SOCKET, get(ws_upgrade_handler))
            .route(Routes::HEALTH, get(health_handler))
            .with_state(state);

        let app = if config.enable_cors {
            app.layer(CorsLayer::permissive())
        } else {
            app
        };

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("Notification server listening on http://{}:{}", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            notification_tx,
            store,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Record a notification and push it to every connected socket.
    pub fn broadcast(&self, notification: Notification) {
        publish(&self.store, &self.notification_tx, notification);
    }

    /// Subscribe to the raw broadcast frames (JSON text).
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.notification_tx.subscribe()
    }

    /// Live broadcast receivers: one per open socket, plus any taken with
    /// [`subscribe`](Self::subscribe).
    pub fn subscriber_count(&self) -> usize {
        self.notification_tx.receiver_count()
    }

    pub fn history(&self) -> Vec<Notification> {
        self.store.recent()
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Notification server stopped");
    }
}

fn publish(store: &NotificationStore, tx: &broadcast::Sender<String>, notification: Notification) {
    let title = notification.title.clone();
    store.push(notification.clone());
    // No receivers is fine
    let _ = tx.send(SocketMessage::Notification { payload: notification }.to_json());
    info!("Notification broadcasted: {title}");
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

fn bad_request(message: impl Into<String>) -> Response {
    let message = message.into();
    debug!("Rejected notification: {message}");
    (StatusCode::BAD_REQUEST, Json(json!({ "message": message }))).into_response()
}

async fn create_notification_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(format!("Invalid JSON body: {}", rejection.body_text())),
    };

    let payload = match NotificationPayload::from_json(body) {
        Ok(p) => p,
        Err(e) => return bad_request(e.client_message()),
    };

    let id = uuid::Uuid::new_v4().to_string();
    let notification = match payload.into_notification(id, &state.config.default_source, Utc::now()) {
        Ok(n) => n,
        Err(e) => return bad_request(e.client_message()),
    };

    publish(&state.store, &state.notification_tx, notification.clone());

    (
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "notification": notification,
        })),
    )
        .into_response()
}

async fn list_notifications_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "notifications": state.store.recent() }))
}

async fn get_notification_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get(&id) {
        Some(notification) => Json(json!({ "notification": notification })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": format!("Notification not found: {id}") })),
        )
            .into_response(),
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.client_count.load(Ordering::Relaxed),
        "stored": state.store.len(),
    }))
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    // Reserve a slot before upgrading so concurrent upgrades cannot overshoot
    let reserved = match state.config.max_connections {
        Some(max) => state
            .client_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_ok(),
        None => {
            state.client_count.fetch_add(1, Ordering::AcqRel);
            true
        }
    };
    if !reserved {
        warn!(
            "Connection rejected: max connections reached ({})",
            state.config.max_connections.unwrap_or_default()
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let failed_state = state.clone();
    ws.on_failed_upgrade(move |e: axum::Error| {
        failed_state.client_count.fetch_sub(1, Ordering::AcqRel);
        warn!("WebSocket upgrade failed: {e}");
    })
    .on_upgrade(move |socket| handle_ws_connection(socket, state))
    .into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

/// The connection slot was reserved by the upgrade handler and is released here.
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let mut conn = SocketConnection::new(uuid::Uuid::new_v4().to_string());
    info!("Client connected: {}", conn.id);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut notification_rx = state.notification_tx.subscribe();

    let mut heartbeat = tokio::time::interval(state.config.heartbeat_interval);
    // The first tick completes immediately
    heartbeat.tick().await;

    loop {
        tokio::select! {
            // Incoming WebSocket message
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        conn.touch();
                        if let Some(reply) = handle_message(&text, &mut conn, &state) {
                            if let Err(e) = ws_tx.send(Message::Text(reply.into())).await {
                                error!("Failed to send reply to {}: {e}", conn.id);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        conn.touch();
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => conn.touch(),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client disconnected: {}", conn.id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {e}", conn.id);
                        break;
                    }
                    _ => {}
                }
            }

            // Broadcast notifications to this client
            notification = notification_rx.recv() => {
                match notification {
                    Ok(msg) => {
                        if let Err(e) = ws_tx.send(Message::Text(msg.into())).await {
                            error!("Failed to broadcast to {}: {e}", conn.id);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {} lagged, skipped {skipped} notifications", conn.id);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            // Liveness check
            _ = heartbeat.tick() => {
                if !conn.alive {
                    warn!("Terminating stale client {}", conn.id);
                    break;
                }
                conn.alive = false;
                if ws_tx.send(Message::Ping(axum::body::Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.client_count.fetch_sub(1, Ordering::AcqRel);
    info!(
        "Client disconnected: {} (app: {}, total: {})",
        conn.id,
        conn.app_id.as_deref().unwrap_or("unregistered"),
        state.client_count.load(Ordering::Relaxed)
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Handle one inbound text frame, returning the reply to send (if any).
fn handle_message(text: &str, conn: &mut SocketConnection, state: &AppState) -> Option<String> {
    let message: SocketMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("Error processing message from {}: {e}", conn.id);
            return None;
        }
    };

    match message {
        SocketMessage::Register { app_id } => {
            info!("Client {} registered with appId: {app_id}", conn.id);
            conn.register(app_id.clone());
            Some(SocketMessage::Registered { app_id }.to_json())
        }
        SocketMessage::Ping => Some(SocketMessage::Pong.to_json()),
        SocketMessage::Event { event, payload } if event == NEW_NOTIFICATION_EVENT => {
            match accept_event_payload(payload, &state.config.default_source) {
                Ok(notification) => publish(&state.store, &state.notification_tx, notification),
                Err(e) => warn!("Rejected notification event from {}: {e}", conn.id),
            }
            None
        }
        other => {
            debug!("Ignoring client message from {}: {other:?}", conn.id);
            None
        }
    }
}

/// Publishable notification from a `new_notification` event. A non-empty
/// `id` in the payload is kept; otherwise one is assigned.
fn accept_event_payload(payload: Value, default_source: &str) -> Result<Notification, ProtocolError> {
    let id = payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    NotificationPayload::from_json(payload)?.into_notification(id, default_source, Utc::now())
}
