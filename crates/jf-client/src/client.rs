//! NotificationClient: lifecycle, pending queue, and dispatch.
//!
//! The client starts **Disconnected**. Notifications sent in that state are
//! queued in FIFO order. `init()` moves it to **Connected** and flushes the
//! queue; from then on every notification is dispatched immediately.
//! `dispose()` moves it to **Disposed** from any state.
//!
//! Dispatch is two steps: a synchronous fan-out to every listener in
//! registration order, then a single remote delivery attempt. Listener fan-out
//! of one notification never interleaves with another's; remote deliveries
//! may overlap freely.

use std::collections::VecDeque;
use std::sync::Arc;

use futures_util::future::join_all;
use jf_protocol::{DEFAULT_SOURCE, Notification, NotificationOptions, NotificationType};
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::delivery::{Delivery, DeliveryError, HttpDelivery};
use crate::listener::{FanOut, ListenerOutcome, ListenerRegistry, Subscription};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Source stamped on notifications that do not name one
    pub default_source: String,
    /// Maximum queued notifications while disconnected; the oldest is
    /// evicted when full. `None` leaves the queue unbounded.
    pub max_pending: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_source: DEFAULT_SOURCE.into(),
            max_pending: Some(1024),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connected,
    Disposed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("notification client has been disposed")]
    Disposed,
}

/// Result of dispatching one notification.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub notification: Arc<Notification>,
    /// One entry per listener, in registration order
    pub listeners: Vec<ListenerOutcome>,
    /// Decoded response body, or why delivery failed
    pub delivery: Result<Value, DeliveryError>,
}

impl DispatchReport {
    pub fn delivered(&self) -> bool {
        self.delivery.is_ok()
    }

    pub fn listener_faults(&self) -> usize {
        self.listeners.iter().filter(|o| !o.is_delivered()).count()
    }
}

/// Outcome of `send_notification`.
///
/// `Queued` is not a failure: the notification will be dispatched when the
/// client connects.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Queued,
    Delivered(DispatchReport),
    Failed(DispatchReport),
}

impl SendOutcome {
    /// `true` only when the endpoint accepted the notification.
    pub fn delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }

    pub fn report(&self) -> Option<&DispatchReport> {
        match self {
            Self::Queued => None,
            Self::Delivered(report) | Self::Failed(report) => Some(report),
        }
    }
}

/// Invoked once, with the client, after the first successful `init()`.
pub type ReadyHook<D> = Box<dyn FnOnce(&NotificationClient<D>) + Send>;

struct Inner {
    state: ClientState,
    pending: VecDeque<Arc<Notification>>,
}

pub struct NotificationClient<D: Delivery = HttpDelivery> {
    config: ClientConfig,
    delivery: D,
    inner: Mutex<Inner>,
    listeners: Arc<ListenerRegistry>,
    /// Held for the whole listener loop of one notification.
    fan_out_gate: Arc<Mutex<()>>,
    ready_hook: Mutex<Option<ReadyHook<D>>>,
}

impl<D: Delivery> NotificationClient<D> {
    pub fn new(delivery: D) -> Self {
        Self::with_config(ClientConfig::default(), delivery)
    }

    pub fn with_config(config: ClientConfig, delivery: D) -> Self {
        Self {
            config,
            delivery,
            inner: Mutex::new(Inner {
                state: ClientState::Disconnected,
                pending: VecDeque::new(),
            }),
            listeners: ListenerRegistry::new(),
            fan_out_gate: Arc::new(Mutex::new(())),
            ready_hook: Mutex::new(None),
        }
    }

    // ── Introspection ────────────────────────────────────────────────────

    pub fn state(&self) -> ClientState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn delivery(&self) -> &D {
        &self.delivery
    }

    // ── Listeners ────────────────────────────────────────────────────────

    /// Register a listener. It receives every notification dispatched after
    /// this call, including queued ones flushed by a later `init()`.
    pub fn on_notification<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.listeners.register(Arc::new(listener))
    }

    /// Fan out a notification received from elsewhere (the realtime socket,
    /// polling) to the listeners. Nothing is delivered remotely.
    pub fn receive(&self, notification: &Notification) -> Vec<ListenerOutcome> {
        self.fan_out_handle().run(notification)
    }

    pub(crate) fn fan_out_handle(&self) -> FanOut {
        FanOut {
            registry: self.listeners.clone(),
            gate: self.fan_out_gate.clone(),
        }
    }

    /// Set the hook run once after the first `init()` completes.
    pub fn set_ready_hook<F>(&self, hook: F)
    where
        F: FnOnce(&NotificationClient<D>) + Send + 'static,
    {
        *self.ready_hook.lock() = Some(Box::new(hook));
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Connect and flush the pending queue in enqueue order.
    ///
    /// Returns one report per flushed notification. With an empty queue this
    /// only marks the client connected.
    pub async fn init(&self) -> Vec<DispatchReport> {
        let (flushed, fan_outs) = {
            let _gate = self.fan_out_gate.lock();
            let queued: Vec<Arc<Notification>> = {
                let mut inner = self.inner.lock();
                if inner.state == ClientState::Disposed {
                    warn!("init() called on a disposed notification client");
                    return Vec::new();
                }
                inner.state = ClientState::Connected;
                inner.pending.drain(..).collect()
            };

            info!("Notification client initialized");
            if !queued.is_empty() {
                info!("Processing {} queued notifications", queued.len());
            }

            let fan_outs: Vec<Vec<ListenerOutcome>> = queued
                .iter()
                .map(|n| self.listeners.fan_out(n))
                .collect();
            (queued, fan_outs)
        };

        let deliveries = join_all(flushed.iter().map(|n| self.deliver(n))).await;

        let reports = flushed
            .into_iter()
            .zip(fan_outs)
            .zip(deliveries)
            .map(|((notification, listeners), delivery)| DispatchReport {
                notification,
                listeners,
                delivery,
            })
            .collect();

        let hook = self.ready_hook.lock().take();
        if let Some(hook) = hook {
            hook(self);
        }

        reports
    }

    /// Drop all listeners and queued notifications. Returns how many queued
    /// notifications were discarded.
    pub fn dispose(&self) -> usize {
        let discarded = {
            let mut inner = self.inner.lock();
            inner.state = ClientState::Disposed;
            let discarded = inner.pending.len();
            inner.pending.clear();
            discarded
        };
        self.listeners.clear();
        self.ready_hook.lock().take();

        if discarded > 0 {
            warn!("Discarded {discarded} queued notifications on dispose");
        }
        info!("Notification client disposed");
        discarded
    }

    // ── Sending ──────────────────────────────────────────────────────────

    /// Build and send a notification.
    ///
    /// Connected: dispatches now and waits for the remote delivery.
    /// Disconnected: queues it and returns `Queued` immediately.
    pub async fn send_notification(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
        kind: NotificationType,
        options: NotificationOptions,
    ) -> Result<SendOutcome, ClientError> {
        let mut options = options;
        if options.source.is_none() {
            options.source = Some(self.config.default_source.clone());
        }
        let notification = Arc::new(Notification::new(title, description, kind, options));

        {
            let mut inner = self.inner.lock();
            match inner.state {
                ClientState::Disposed => return Err(ClientError::Disposed),
                ClientState::Disconnected => {
                    self.enqueue(&mut inner, notification);
                    return Ok(SendOutcome::Queued);
                }
                ClientState::Connected => {}
            }
        }

        let report = self.dispatch(notification).await;
        Ok(if report.delivered() {
            SendOutcome::Delivered(report)
        } else {
            SendOutcome::Failed(report)
        })
    }

    /// `send_notification` with type `info` and no options.
    pub async fn notify(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<SendOutcome, ClientError> {
        self.send_notification(title, description, NotificationType::Info, NotificationOptions::new())
            .await
    }

    // ── Internal ─────────────────────────────────────────────────────────

    fn enqueue(&self, inner: &mut Inner, notification: Arc<Notification>) {
        if let Some(cap) = self.config.max_pending {
            let cap = cap.max(1);
            while inner.pending.len() >= cap {
                if let Some(evicted) = inner.pending.pop_front() {
                    warn!(
                        "Pending queue full ({cap}), dropping oldest notification {}",
                        evicted.source_id
                    );
                }
            }
        }
        inner.pending.push_back(notification);
        debug!("Notification queued for later delivery (pending: {})", inner.pending.len());
    }

    async fn dispatch(&self, notification: Arc<Notification>) -> DispatchReport {
        let listeners = {
            let _gate = self.fan_out_gate.lock();
            self.listeners.fan_out(&notification)
        };
        let delivery = self.deliver(&notification).await;
        DispatchReport {
            notification,
            listeners,
            delivery,
        }
    }

    async fn deliver(&self, notification: &Notification) -> Result<Value, DeliveryError> {
        let result = self.delivery.deliver(notification).await;
        match &result {
            Ok(body) => info!("Notification sent successfully: {body}"),
            Err(DeliveryError::Status { status, body }) => {
                error!("Failed to send notification ({status}): {body}")
            }
            Err(e) => error!("Error sending notification to API: {e}"),
        }
        result
    }
}
