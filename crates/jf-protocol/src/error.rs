//! Protocol-level errors.

use thiserror::Error;

/// Errors raised while parsing or validating notification data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A `type` string outside info | success | warning | error.
    #[error("Invalid notification type: {0}")]
    UnknownType(String),

    /// `title` or `description` missing or empty.
    #[error("Title and description are required")]
    MissingContent,

    /// The body did not decode as a notification payload.
    #[error("Invalid notification payload: {0}")]
    InvalidPayload(String),
}

impl ProtocolError {
    /// Message for the `{"message": ...}` body of a rejected request. The
    /// offending type string stays in `Display` only.
    pub fn client_message(&self) -> String {
        match self {
            Self::UnknownType(_) => "Invalid notification type".to_string(),
            other => other.to_string(),
        }
    }
}
