//! Events produced by the project aggregate.

use iamcore_core::event::{Event, EventError};
use serde::{Deserialize, Serialize};

/// Every fact that can happen to a project aggregate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum ProjectEvent {
    /// The project was created. Always version 1.
    Created {
        /// The organization this project belongs to. Immutable after
        /// creation.
        organization_id: String,
        /// Unique, URL-safe slug within the owning organization.
        slug: String,
        /// Display name.
        name: String,
    },
    /// The display name changed.
    Updated {
        /// The new display name.
        name: String,
    },
    /// The project was deactivated.
    Deactivated,
}

impl Event for ProjectEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created { .. } => "project.created.v1",
            Self::Updated { .. } => "project.updated.v1",
            Self::Deactivated => "project.deactivated.v1",
        }
    }
}

impl ProjectEvent {
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
            "project.created.v1" | "project.updated.v1" | "project.deactivated.v1" => {
                Self::from_payload(payload)
            },
            other => Err(EventError::UnknownEventType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_event_type() {
        let event = ProjectEvent::Created {
            organization_id: "o-1".to_string(),
            slug: "web".to_string(),
            name: "Web".to_string(),
        };
        assert_eq!(event.event_type(), "project.created.v1");
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn decode_round_trips_through_payload() {
        let event = ProjectEvent::Deactivated;
        let payload = event.to_payload().expect("serialize");
        let decoded = ProjectEvent::decode("project.deactivated.v1", &payload).expect("decode");
        assert_eq!(decoded, event);
    }

    #[test]
    fn decode_rejects_unknown_event_type() {
        let result = ProjectEvent::decode("project.nonsense.v1", &serde_json::json!({}));
        assert!(matches!(result, Err(EventError::UnknownEventType(_))));
    }
}
