//! Event trait and related types for event sourcing.
//!
//! This module defines the core abstraction for events in an event-sourced system.
//! Events represent facts about things that have happened in the past and are immutable.
//!
//! # Design
//!
//! Events are serialized to `serde_json::Value` rather than a binary format. The
//! eventstore's forward-compatibility guarantee (readers must ignore fields they
//! don't recognize) is much cheaper to provide over a self-describing JSON document
//! than over a binary encoding that would need its own schema-evolution story.

use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to a JSON payload.
    #[error("failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from a JSON payload.
    #[error("failed to deserialize event: {0}")]
    DeserializationError(String),

    /// Unknown event type encountered during deserialization.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),
}

/// An event that can be stored in an event store and replayed to reconstruct state.
///
/// Events represent immutable facts about things that have happened in the past.
/// They are the source of truth in an event-sourced system.
///
/// # Event Naming Convention
///
/// The `event_type()` method should return a stable string identifier that includes
/// a version number, e.g. `"user.created.v1"`, `"org.member_added.v1"`. This allows
/// projections to evolve their handling of a payload shape over time without
/// breaking readers of older events.
pub trait Event: Send + Sync + 'static {
    /// Returns the event type identifier for this event.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the event cannot be
    /// represented as JSON.
    fn to_payload(&self) -> Result<serde_json::Value, EventError>
    where
        Self: Serialize,
    {
        serde_json::to_value(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from a JSON payload.
    ///
    /// Unknown fields present in `payload` that are not part of `Self` are
    /// silently ignored by `serde_json`, which is what gives projections
    /// forward compatibility against newer event producers.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the payload is missing a
    /// field `Self` requires or has an incompatible shape.
    fn from_payload(payload: &serde_json::Value) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        serde_json::from_value(payload.clone())
            .map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event ready for storage.
///
/// This struct contains the event type name and the JSON payload, along with
/// optional metadata. It's used as the wire format between the application
/// and the event store.
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., `"user.created.v1"`).
    pub event_type: String,

    /// The JSON-encoded event payload.
    pub payload: serde_json::Value,

    /// Optional metadata.
    ///
    /// Common metadata fields:
    /// - `correlation_id`: Links related events across aggregates
    /// - `causation_id`: Links cause-and-effect events
    /// - `actor_id`: The principal who triggered this event
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    #[must_use]
    pub const fn new(
        event_type: String,
        payload: serde_json::Value,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            payload,
            metadata,
        }
    }

    /// Create a serialized event from an `Event` trait object.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the event cannot be serialized.
    pub fn from_event<E: Event + Serialize>(
        event: &E,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            payload: event.to_payload()?,
            metadata,
        })
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerializedEvent {{ type: {} }}", self.event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    enum TestEvent {
        Created { id: String, value: i32 },
        Updated { id: String, new_value: i32 },
    }

    impl Event for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::Created { .. } => "test_event.created.v1",
                TestEvent::Updated { .. } => "test_event.updated.v1",
            }
        }
    }

    #[test]
    fn event_type_returns_correct_identifier() {
        let event = TestEvent::Created {
            id: "test-1".to_string(),
            value: 42,
        };
        assert_eq!(event.event_type(), "test_event.created.v1");
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn event_payload_roundtrip() {
        let event = TestEvent::Created {
            id: "test-1".to_string(),
            value: 42,
        };

        let payload = event.to_payload().expect("serialization should succeed");
        let deserialized =
            TestEvent::from_payload(&payload).expect("deserialization should succeed");

        assert_eq!(event, deserialized);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn unknown_fields_in_payload_are_ignored() {
        let payload = serde_json::json!({
            "Updated": { "id": "test-1", "new_value": 7, "future_field": "ignored" }
        });

        let deserialized =
            TestEvent::from_payload(&payload).expect("unknown fields must not break decoding");

        assert_eq!(
            deserialized,
            TestEvent::Updated {
                id: "test-1".to_string(),
                new_value: 7
            }
        );
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn serialized_event_from_event() {
        let event = TestEvent::Updated {
            id: "test-1".to_string(),
            new_value: 100,
        };

        let metadata = serde_json::json!({
            "actor_id": "user-123",
            "correlation_id": "corr-456"
        });

        let serialized = SerializedEvent::from_event(&event, Some(metadata.clone()))
            .expect("serialization should succeed");

        assert_eq!(serialized.event_type, "test_event.updated.v1");
        assert_eq!(serialized.metadata, Some(metadata));
    }

    #[test]
    fn serialized_event_display() {
        let serialized =
            SerializedEvent::new("test_event.v1".to_string(), serde_json::json!({}), None);

        let display = format!("{serialized}");
        assert!(display.contains("test_event.v1"));
    }
}
