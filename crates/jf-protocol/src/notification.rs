//! The notification record and the typed option bag used to build it.
//!
//! A `Notification` carries a fixed set of known fields plus an open
//! extension bag. Callers can override any default, including the generated
//! `timestamp` and `sourceId`, either through the typed setters on
//! [`NotificationOptions`] or by naming the field in [`NotificationOptions::field`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ProtocolError;

/// Source recorded when the caller does not supply one.
pub const DEFAULT_SOURCE: &str = "jaysframes-web";

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationType {
    pub const ALL: [NotificationType; 4] = [Self::Info, Self::Success, Self::Warning, Self::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownType(s.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notification
// ─────────────────────────────────────────────────────────────────────────────

/// An event broadcast to local listeners and delivered to the endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Assigned by the receiving endpoint; absent on client-built records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub source_id: String,
    #[serde(default)]
    pub actionable: bool,
    #[serde(default)]
    pub link: String,
    /// Caller-supplied fields with no dedicated slot.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Notification {
    /// Build a notification stamped with the current instant.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        kind: NotificationType,
        options: NotificationOptions,
    ) -> Self {
        Self::build_at(title, description, kind, options, Utc::now())
    }

    /// Build a notification as if created at `now`.
    ///
    /// Defaults are applied first, then typed options, then `extra` fields,
    /// so a field named in `extra` wins over its typed setter.
    pub fn build_at(
        title: impl Into<String>,
        description: impl Into<String>,
        kind: NotificationType,
        options: NotificationOptions,
        now: DateTime<Utc>,
    ) -> Self {
        let NotificationOptions {
            source,
            source_id,
            actionable,
            link,
            timestamp,
            extra,
        } = options;

        let mut notification = Self {
            id: None,
            title: title.into(),
            description: description.into(),
            kind,
            timestamp: timestamp.unwrap_or(now),
            source: source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            source_id: source_id
                .unwrap_or_else(|| format!("notification-{}", now.timestamp_millis())),
            actionable: actionable.unwrap_or(false),
            link: link.unwrap_or_default(),
            extra: Map::new(),
        };

        for (key, value) in extra {
            notification.apply_field(key, value);
        }
        notification
    }

    /// Timestamp in the `YYYY-MM-DDTHH:MM:SS.mmmZ` form used on the wire.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Route a named field onto the record. Known fields are overwritten when
    /// the value has a matching JSON type and are otherwise dropped with a
    /// warning; unknown keys land in the extension bag.
    fn apply_field(&mut self, key: String, value: Value) {
        let applied = match key.as_str() {
            "id" => match value.as_str() {
                Some(s) => {
                    self.id = Some(s.to_string());
                    true
                }
                None => false,
            },
            "title" => overwrite_string(&mut self.title, &value),
            "description" => overwrite_string(&mut self.description, &value),
            "source" => overwrite_string(&mut self.source, &value),
            "sourceId" => overwrite_string(&mut self.source_id, &value),
            "link" => overwrite_string(&mut self.link, &value),
            "type" => match value.as_str().and_then(|s| s.parse().ok()) {
                Some(kind) => {
                    self.kind = kind;
                    true
                }
                None => false,
            },
            "timestamp" => match value.as_str().and_then(parse_timestamp) {
                Some(ts) => {
                    self.timestamp = ts;
                    true
                }
                None => false,
            },
            "actionable" => match value.as_bool() {
                Some(b) => {
                    self.actionable = b;
                    true
                }
                None => false,
            },
            _ => {
                self.extra.insert(key, value);
                return;
            }
        };

        if !applied {
            warn!("Dropping field `{key}`: {value} is not a valid value for it");
        }
    }
}

fn overwrite_string(slot: &mut String, value: &Value) -> bool {
    match value.as_str() {
        Some(s) => {
            *slot = s.to_string();
            true
        }
        None => false,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid ISO-8601 timestamp: {raw}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// Optional overrides applied when building a [`Notification`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationOptions {
    pub source: Option<String>,
    pub source_id: Option<String>,
    pub actionable: Option<bool>,
    pub link: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Extra fields, applied after the typed options.
    pub extra: Map<String, Value>,
}

impl NotificationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn actionable(mut self, actionable: bool) -> Self {
        self.actionable = Some(actionable);
        self
    }

    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach an arbitrary field. Naming a known field (`"source"`,
    /// `"timestamp"`, `"type"`, ...) overrides it.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound payload
// ─────────────────────────────────────────────────────────────────────────────

/// A loosely-typed notification as posted to the endpoint.
///
/// Everything is optional so validation can report precise errors instead
/// of a generic decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub actionable: Option<bool>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationPayload {
    pub fn from_json(value: Value) -> Result<Self, ProtocolError> {
        if !value.is_object() {
            return Err(ProtocolError::InvalidPayload("expected a JSON object".into()));
        }
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
    }

    /// Validate and turn the payload into a stored notification.
    ///
    /// `default_source` fills a missing `source`. A missing or unparsable
    /// `timestamp` becomes `now`. Any client-sent `id` is replaced by `id`.
    pub fn into_notification(
        self,
        id: String,
        default_source: &str,
        now: DateTime<Utc>,
    ) -> Result<Notification, ProtocolError> {
        let title = self.title.filter(|t| !t.is_empty());
        let description = self.description.filter(|d| !d.is_empty());
        let (Some(title), Some(description)) = (title, description) else {
            return Err(ProtocolError::MissingContent);
        };

        // An empty type counts as absent.
        let kind = match self.kind.as_deref() {
            Some(raw) if !raw.is_empty() => raw.parse()?,
            _ => NotificationType::default(),
        };

        let mut extra = self.extra;
        extra.remove("id");

        Ok(Notification {
            id: Some(id),
            title,
            description,
            kind,
            timestamp: self.timestamp.as_deref().and_then(parse_timestamp).unwrap_or(now),
            source: self.source.unwrap_or_else(|| default_source.to_string()),
            source_id: self.source_id.unwrap_or_default(),
            actionable: self.actionable.unwrap_or(false),
            link: self.link.unwrap_or_default(),
            extra,
        })
    }
}
