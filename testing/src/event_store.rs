//! An in-memory [`EventStore`] for fast, deterministic tests.
//!
//! Mirrors [`iamcore_postgres::PostgresEventStore`]'s concurrency and
//! ordering contract without a database: per-aggregate version is still
//! checked under a single lock, and every event pushed in the same call
//! shares one `position`, differing only by `in_position_order` — the same
//! invariants P1-P3 in the spec's testable-properties section describe.

use iamcore_core::event::SerializedEvent;
use iamcore_core::event_store::{EventStore, EventStoreError, ReadSinceFilter, StoredEvent};
use iamcore_core::identity::{AggregateId, AggregateVersion, GlobalPosition, InstanceId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

type AggregateKey = (InstanceId, String, AggregateId);

#[derive(Default)]
struct Inner {
    by_aggregate: HashMap<AggregateKey, Vec<StoredEvent>>,
    by_instance: HashMap<InstanceId, Vec<StoredEvent>>,
    next_position: i64,
}

/// An in-memory, single-process [`EventStore`].
///
/// Not durable and not meant to be shared across processes; built fresh per
/// test. Safe to share across tasks within one process via `Arc`.
pub struct InMemoryEventStore {
    inner: Mutex<Inner>,
    max_push_batch_size: usize,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    /// Build an empty store with the default push batch limit (500, per
    /// `EventstoreConfig`'s default).
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_batch_size(500)
    }

    /// Build an empty store with a custom push batch limit, for testing
    /// `BatchTooLarge` behavior.
    #[must_use]
    pub fn with_max_batch_size(max_push_batch_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_push_batch_size,
        }
    }
}

fn matches_filter(event: &StoredEvent, filter: &ReadSinceFilter) -> bool {
    if let Some(types) = &filter.aggregate_types {
        if !types.contains(&event.aggregate_type) {
            return false;
        }
    }
    if let Some(types) = &filter.event_types {
        if !types.contains(&event.event.event_type) {
            return false;
        }
    }
    true
}

impl EventStore for InMemoryEventStore {
    fn push(
        &self,
        instance_id: InstanceId,
        aggregate_type: String,
        aggregate_id: AggregateId,
        expected_version: AggregateVersion,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<AggregateVersion, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            if events.is_empty() {
                return Err(EventStoreError::EmptyBatch);
            }
            if events.len() > self.max_push_batch_size {
                return Err(EventStoreError::BatchTooLarge {
                    actual: events.len(),
                    max: self.max_push_batch_size,
                });
            }

            let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let key = (instance_id.clone(), aggregate_type.clone(), aggregate_id.clone());

            let current_version = inner
                .by_aggregate
                .get(&key)
                .and_then(|events| events.last())
                .map_or(AggregateVersion::NONE, |e| e.aggregate_version);

            if current_version != expected_version {
                return Err(EventStoreError::ConcurrencyConflict {
                    instance_id,
                    aggregate_type,
                    aggregate_id,
                    expected: expected_version,
                    actual: current_version,
                });
            }

            inner.next_position += 1;
            let position = inner.next_position;

            let mut next_version = expected_version;
            let mut stored = Vec::with_capacity(events.len());
            for (i, event) in events.into_iter().enumerate() {
                next_version = next_version.next();
                #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
                let in_position_order = i as i32;
                stored.push(StoredEvent {
                    instance_id: instance_id.clone(),
                    aggregate_type: aggregate_type.clone(),
                    aggregate_id: aggregate_id.clone(),
                    aggregate_version: next_version,
                    global_position: GlobalPosition::new(position, in_position_order),
                    event,
                });
            }

            inner
                .by_aggregate
                .entry(key)
                .or_default()
                .extend(stored.iter().cloned());
            inner
                .by_instance
                .entry(instance_id)
                .or_default()
                .extend(stored);

            Ok(next_version)
        })
    }

    fn read_aggregate(
        &self,
        instance_id: InstanceId,
        aggregate_type: String,
        aggregate_id: AggregateId,
        from_version: Option<AggregateVersion>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let key = (instance_id, aggregate_type, aggregate_id);
            let from = from_version.unwrap_or(AggregateVersion::NONE);
            Ok(inner
                .by_aggregate
                .get(&key)
                .map(|events| {
                    events
                        .iter()
                        .filter(|e| e.aggregate_version > from || from == AggregateVersion::NONE)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn read_since(
        &self,
        instance_id: InstanceId,
        after: GlobalPosition,
        limit: u32,
        filter: ReadSinceFilter,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<StoredEvent>, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let events = inner
                .by_instance
                .get(&instance_id)
                .map(|events| {
                    events
                        .iter()
                        .filter(|e| e.global_position > after)
                        .filter(|e| matches_filter(e, &filter))
                        .take(limit as usize)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            Ok(events)
        })
    }

    fn current_position(
        &self,
        instance_id: InstanceId,
    ) -> Pin<Box<dyn Future<Output = Result<GlobalPosition, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            Ok(inner
                .by_instance
                .get(&instance_id)
                .and_then(|events| events.last())
                .map_or(GlobalPosition::BEGINNING, |e| e.global_position))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str) -> SerializedEvent {
        SerializedEvent::new(event_type.to_string(), serde_json::json!({}), None)
    }

    #[tokio::test]
    async fn push_then_read_aggregate_round_trips() {
        let store = InMemoryEventStore::new();
        let instance = InstanceId::new("acme");

        store
            .push(
                instance.clone(),
                "user".to_string(),
                AggregateId::new("u-1"),
                AggregateVersion::NONE,
                vec![event("user.created.v1")],
            )
            .await
            .expect("push succeeds");

        let events = store
            .read_aggregate(instance, "user".to_string(), AggregateId::new("u-1"), None)
            .await
            .expect("read succeeds");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].aggregate_version, AggregateVersion::new(1));
    }

    #[tokio::test]
    async fn stale_expected_version_is_a_concurrency_conflict() {
        let store = InMemoryEventStore::new();
        let instance = InstanceId::new("acme");

        store
            .push(
                instance.clone(),
                "user".to_string(),
                AggregateId::new("u-1"),
                AggregateVersion::NONE,
                vec![event("user.created.v1")],
            )
            .await
            .expect("first push succeeds");

        let result = store
            .push(
                instance,
                "user".to_string(),
                AggregateId::new("u-1"),
                AggregateVersion::NONE,
                vec![event("user.created.v1")],
            )
            .await;

        assert!(matches!(result, Err(EventStoreError::ConcurrencyConflict { .. })));
    }

    #[tokio::test]
    async fn read_since_respects_instance_isolation() {
        let store = InMemoryEventStore::new();
        let acme = InstanceId::new("acme");
        let globex = InstanceId::new("globex");

        store
            .push(
                acme.clone(),
                "user".to_string(),
                AggregateId::new("u-1"),
                AggregateVersion::NONE,
                vec![event("user.created.v1")],
            )
            .await
            .expect("push to acme");
        store
            .push(
                globex.clone(),
                "user".to_string(),
                AggregateId::new("u-1"),
                AggregateVersion::NONE,
                vec![event("user.created.v1")],
            )
            .await
            .expect("push to globex");

        let acme_events = store
            .read_since(acme.clone(), GlobalPosition::BEGINNING, 10, ReadSinceFilter::default())
            .await
            .expect("read succeeds");

        assert_eq!(acme_events.len(), 1);
        assert_eq!(acme_events[0].instance_id, acme);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let store = InMemoryEventStore::new();
        let result = store
            .push(
                InstanceId::new("acme"),
                "user".to_string(),
                AggregateId::new("u-1"),
                AggregateVersion::NONE,
                vec![],
            )
            .await;
        assert!(matches!(result, Err(EventStoreError::EmptyBatch)));
    }

    #[tokio::test]
    async fn batch_over_configured_limit_is_rejected() {
        let store = InMemoryEventStore::with_max_batch_size(1);
        let result = store
            .push(
                InstanceId::new("acme"),
                "user".to_string(),
                AggregateId::new("u-1"),
                AggregateVersion::NONE,
                vec![event("a"), event("b")],
            )
            .await;
        assert!(matches!(result, Err(EventStoreError::BatchTooLarge { .. })));
    }
}
