//! Remote delivery: the seam between the dispatch client and the network.

use std::time::Duration;

use jf_protocol::{Headers, Notification, Routes};
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use thiserror::Error;

/// Failure of a single remote delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The endpoint answered with a non-2xx status.
    #[error("endpoint responded {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never completed.
    #[error("network error: {0}")]
    Network(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Setup(String),
}

/// Delivers one notification to the remote endpoint.
///
/// Implementations resolve to the decoded response body on success. They
/// must not retry: the client reports every failure as-is.
pub trait Delivery: Send + Sync + 'static {
    fn deliver(
        &self,
        notification: &Notification,
    ) -> impl std::future::Future<Output = Result<Value, DeliveryError>> + Send;
}

/// Configuration for [`HttpDelivery`].
#[derive(Debug, Clone)]
pub struct HttpDeliveryConfig {
    /// Origin of the endpoint, e.g. `http://127.0.0.1:3000`
    pub base_url: String,
    /// Sent as `X-API-Key` (with `X-App-ID`) when present
    pub api_key: Option<String>,
    /// Identifies this client to the endpoint
    pub app_id: String,
    /// Per-request timeout; `None` keeps the HTTP stack default
    pub timeout: Option<Duration>,
}

impl Default for HttpDeliveryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".into(),
            api_key: None,
            app_id: generate_app_id(),
            timeout: None,
        }
    }
}

impl HttpDeliveryConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

/// `POST /api/notifications` over reqwest.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    app_id: String,
}

impl HttpDelivery {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DeliveryError> {
        Self::with_config(HttpDeliveryConfig::new(base_url))
    }

    pub fn with_config(config: HttpDeliveryConfig) -> Result<Self, DeliveryError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| DeliveryError::Setup(e.to_string()))?;

        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            http,
            url: format!("{base}{}", Routes::NOTIFICATIONS),
            api_key: config.api_key,
            app_id: config.app_id,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }
}

impl Delivery for HttpDelivery {
    async fn deliver(&self, notification: &Notification) -> Result<Value, DeliveryError> {
        let mut request = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .json(notification);

        if let Some(ref key) = self.api_key {
            request = request
                .header(Headers::API_KEY, key)
                .header(Headers::APP_ID, &self.app_id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;

        if status.is_success() {
            // A 2xx with a non-JSON body still counts as delivered.
            Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
        } else {
            Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// `jf-app-` followed by 13 lowercase base-36 characters.
pub fn generate_app_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..13)
        .map(|_| std::char::from_digit(rng.random_range(0..36), 36).unwrap_or('0'))
        .collect();
    format!("jf-app-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_id_format() {
        let id = generate_app_id();
        let suffix = id.strip_prefix("jf-app-").unwrap();
        assert_eq!(suffix.len(), 13);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn url_joins_base_and_route() {
        let delivery = HttpDelivery::new("http://localhost:3000/").unwrap();
        assert_eq!(delivery.url(), "http://localhost:3000/api/notifications");
    }
}
