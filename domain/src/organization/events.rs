//! Events produced by the organization aggregate.

use iamcore_core::event::{Event, EventError};
use serde::{Deserialize, Serialize};

/// Every fact that can happen to an organization aggregate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum OrganizationEvent {
    /// The organization was created. Always version 1.
    Created {
        /// Unique, URL-safe slug within the instance.
        slug: String,
        /// Display name.
        name: String,
    },
    /// The display name changed. Slug is immutable after creation.
    Updated {
        /// The new display name.
        name: String,
    },
    /// The organization was deactivated.
    Deactivated,
}

impl Event for OrganizationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created { .. } => "organization.created.v1",
            Self::Updated { .. } => "organization.updated.v1",
            Self::Deactivated => "organization.deactivated.v1",
        }
    }
}

impl OrganizationEvent {
    /// Decode a stored event's payload, identifying the variant by the
    /// wire-level `event_type`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownEventType`] for any `event_type` this
    /// aggregate doesn't produce, or [`EventError::DeserializationError`] if
    /// the payload doesn't match the expected shape for its type.
    pub fn decode(event_type: &str, payload: &serde_json::Value) -> Result<Self, EventError> {
        match event_type {
            "organization.created.v1" | "organization.updated.v1" | "organization.deactivated.v1" => {
                Self::from_payload(payload)
            },
            other => Err(EventError::UnknownEventType(other.to_string())),
        }
    }
}
