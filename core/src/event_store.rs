//! Event store trait and related types for event sourcing.
//!
//! This module defines the core abstraction for an event store: an append-only
//! log of events scoped per tenant (`instance_id`), addressable both per
//! aggregate (for replaying one aggregate's history) and globally (for
//! projections tailing the whole log in commit order).
//!
//! # Dyn Compatibility
//!
//! This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
//! so it can be used as a trait object (`Arc<dyn EventStore>`), which the
//! command bus and projection manager both need in order to hold a single
//! shared handle to the store without committing to a concrete backend type.

use crate::event::SerializedEvent;
use crate::identity::{AggregateId, AggregateVersion, GlobalPosition, InstanceId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// One event as read back from the store, carrying the positions assigned to
/// it at append time in addition to its payload.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredEvent {
    /// The tenant this event belongs to.
    pub instance_id: InstanceId,
    /// The aggregate type this event was appended to.
    pub aggregate_type: String,
    /// The aggregate instance this event was appended to.
    pub aggregate_id: AggregateId,
    /// The aggregate's version immediately after this event was applied.
    pub aggregate_version: AggregateVersion,
    /// This event's position in the instance-wide total order.
    pub global_position: GlobalPosition,
    /// The underlying event type and payload.
    pub event: SerializedEvent,
}

/// Optional filters narrowing a [`EventStore::read_since`] scan.
///
/// An empty filter (all fields `None`) returns every event for the instance
/// from the given position onward, which is what a projection rebuilding
/// from scratch wants; projections interested only in a subset of aggregate
/// types can narrow the scan instead of filtering client-side.
#[derive(Clone, Debug, Default)]
pub struct ReadSinceFilter {
    /// Restrict to events from these aggregate types, if set.
    pub aggregate_types: Option<Vec<String>>,
    /// Restrict to events with these event type identifiers, if set.
    pub event_types: Option<Vec<String>>,
}

/// Errors that can occur during event store operations.
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: expected version doesn't match the
    /// aggregate's current version.
    #[error("concurrency conflict on {instance_id}/{aggregate_type}/{aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The tenant the conflicting aggregate belongs to.
        instance_id: InstanceId,
        /// The aggregate type.
        aggregate_type: String,
        /// The aggregate id where the conflict occurred.
        aggregate_id: AggregateId,
        /// The version the caller expected the aggregate to be at.
        expected: AggregateVersion,
        /// The aggregate's actual current version.
        actual: AggregateVersion,
    },

    /// A push request exceeded `maxPushBatchSize`.
    #[error("push batch of {actual} events exceeds the configured maximum of {max}")]
    BatchTooLarge {
        /// The number of events the caller attempted to push.
        actual: usize,
        /// The configured maximum batch size.
        max: usize,
    },

    /// A push request was empty.
    #[error("push requires at least one event")]
    EmptyBatch,

    /// Database connection or query error.
    #[error("database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// A transient, likely-retryable I/O failure (connection reset, timeout).
    #[error("transient I/O error: {0}")]
    RetryableIoError(String),
}

impl EventStoreError {
    /// Whether a caller should consider retrying the operation that produced
    /// this error without any change in input.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryableIoError(_))
    }
}

/// Event store abstraction: append events to an aggregate and read them back,
/// either scoped to one aggregate or as a tenant-wide ordered stream.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be safely shared across the
/// command bus and projection manager's worker tasks.
pub trait EventStore: Send + Sync {
    /// Append events to an aggregate with optimistic concurrency control.
    ///
    /// `expected_version` must match the aggregate's current version exactly
    /// ([`AggregateVersion::NONE`] for an aggregate that does not exist yet);
    /// a mismatch returns [`EventStoreError::ConcurrencyConflict`]. All events
    /// in `events` are appended atomically and assigned contiguous versions
    /// and the same global `position` (differing only in
    /// `in_position_order`).
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::ConcurrencyConflict`] if `expected_version` is stale.
    /// - [`EventStoreError::EmptyBatch`] if `events` is empty.
    /// - [`EventStoreError::BatchTooLarge`] if `events` exceeds the configured limit.
    /// - [`EventStoreError::DatabaseError`] or [`EventStoreError::RetryableIoError`] on I/O failure.
    fn push(
        &self,
        instance_id: InstanceId,
        aggregate_type: String,
        aggregate_id: AggregateId,
        expected_version: AggregateVersion,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<AggregateVersion, EventStoreError>> + Send + '_>>;

    /// Load one aggregate's events in version order, optionally starting
    /// partway through its history.
    ///
    /// Returns an empty vector if the aggregate has no events (this is not
    /// an error: a fresh aggregate starts empty).
    ///
    /// # Errors
    ///
    /// [`EventStoreError::DatabaseError`] or [`EventStoreError::RetryableIoError`] on I/O failure.
    fn read_aggregate(
        &self,
        instance_id: InstanceId,
        aggregate_type: String,
        aggregate_id: AggregateId,
        from_version: Option<AggregateVersion>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>>;

    /// Tail the instance-wide event log in global order starting strictly
    /// after `after`, returning at most `limit` events.
    ///
    /// This is the primitive projections poll on: a caller repeatedly calls
    /// `read_since(instance_id, last_seen_position, batch_size, filter)`
    /// and advances `last_seen_position` to the last returned event's
    /// `global_position`.
    ///
    /// # Errors
    ///
    /// [`EventStoreError::DatabaseError`] or [`EventStoreError::RetryableIoError`] on I/O failure.
    fn read_since(
        &self,
        instance_id: InstanceId,
        after: GlobalPosition,
        limit: u32,
        filter: ReadSinceFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>>;

    /// The position of the most recently appended event for this instance,
    /// or [`GlobalPosition::BEGINNING`] if the instance has no events yet.
    ///
    /// # Errors
    ///
    /// [`EventStoreError::DatabaseError`] or [`EventStoreError::RetryableIoError`] on I/O failure.
    fn current_position(
        &self,
        instance_id: InstanceId,
    ) -> Pin<Box<dyn Future<Output = Result<GlobalPosition, EventStoreError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_conflict_error_display() {
        let error = EventStoreError::ConcurrencyConflict {
            instance_id: InstanceId::new("acme"),
            aggregate_type: "user".to_string(),
            aggregate_id: AggregateId::new("user-1"),
            expected: AggregateVersion::new(5),
            actual: AggregateVersion::new(7),
        };

        let display = format!("{error}");
        assert!(display.contains("expected version 5"));
        assert!(display.contains("found 7"));
    }

    #[test]
    fn batch_too_large_display() {
        let error = EventStoreError::BatchTooLarge { actual: 501, max: 500 };
        let display = format!("{error}");
        assert!(display.contains("501"));
        assert!(display.contains("500"));
    }

    #[test]
    fn retryable_io_error_is_retryable() {
        let error = EventStoreError::RetryableIoError("connection reset".to_string());
        assert!(error.is_retryable());
        assert!(!EventStoreError::EmptyBatch.is_retryable());
    }
}
