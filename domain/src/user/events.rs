//! Events produced by the user aggregate.

use iamcore_core::event::{Event, EventError};
use serde::{Deserialize, Serialize};

/// Every fact that can happen to a user aggregate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum UserEvent {
    /// The user was created. Always version 1.
    Created {
        /// The user's login name, unique within its instance.
        username: String,
        /// The user's email address.
        email: String,
        /// Given name.
        first_name: String,
        /// Family name.
        last_name: String,
    },
    /// One or more profile fields changed. Fields left `None` are
    /// unchanged; at least one must be `Some` (enforced by the handler's
    /// no-op detection before this event is ever produced).
    Updated {
        /// The new email, if it changed.
        email: Option<String>,
        /// The new given name, if it changed.
        first_name: Option<String>,
        /// The new family name, if it changed.
        last_name: Option<String>,
    },
    /// The user was deactivated. No further mutating commands are accepted
    /// until reactivated (reactivation is out of this aggregate's scope).
    Deactivated,
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created { .. } => "user.created.v1",
            Self::Updated { .. } => "user.updated.v1",
            Self::Deactivated => "user.deactivated.v1",
        }
    }
}

impl UserEvent {
    /// Decode a stored event's payload, identifying the variant by the
    /// wire-level `event_type` rather than trusting the payload's own
    /// `kind` tag alone.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownEventType`] for any `event_type` this
    /// aggregate doesn't produce, or [`EventError::DeserializationError`]
    /// if the payload doesn't match the expected shape for its type.
    pub fn decode(event_type: &str, payload: &serde_json::Value) -> Result<Self, EventError> {
        match event_type {
            "user.created.v1" | "user.updated.v1" | "user.deactivated.v1" => {
                Self::from_payload(payload)
            },
            other => Err(EventError::UnknownEventType(other.to_string())),
        }
    }
}
