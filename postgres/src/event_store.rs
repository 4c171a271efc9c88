//! `PostgreSQL` implementation of the `EventStore` trait.
//!
//! Concurrency control relies on the primary key of the `events` table
//! (`instance_id, aggregate_type, aggregate_id, aggregate_version`): a
//! `push` first reads the aggregate's current version, then inserts rows at
//! the expected next version numbers inside a transaction. If another
//! writer raced it to the same version, the insert hits a unique
//! constraint violation (Postgres error code `23505`), which is mapped to
//! [`EventStoreError::ConcurrencyConflict`] rather than surfaced as a raw
//! database error.

use iamcore_core::event::SerializedEvent;
use iamcore_core::event_store::{EventStore, EventStoreError, ReadSinceFilter, StoredEvent};
use iamcore_core::identity::{AggregateId, AggregateVersion, GlobalPosition, InstanceId};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;

/// Postgres error code for a unique-constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION))
}

fn db_error(err: sqlx::Error) -> EventStoreError {
    if matches!(&err, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) {
        EventStoreError::RetryableIoError(err.to_string())
    } else {
        EventStoreError::DatabaseError(err.to_string())
    }
}

fn row_to_stored_event(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let payload: serde_json::Value = row.get("payload");
    let metadata: Option<serde_json::Value> = row.get("metadata");
    let event_type: String = row.get("event_type");
    Ok(StoredEvent {
        instance_id: InstanceId::new(row.get::<String, _>("instance_id")),
        aggregate_type: row.get("aggregate_type"),
        aggregate_id: AggregateId::new(row.get::<String, _>("aggregate_id")),
        aggregate_version: AggregateVersion::new(
            u64::try_from(row.get::<i64, _>("aggregate_version")).unwrap_or(0),
        ),
        global_position: GlobalPosition::new(
            row.get("global_position"),
            row.get("in_position_order"),
        ),
        event: SerializedEvent::new(event_type, payload, metadata),
    })
}

/// A `PostgreSQL`-backed eventstore.
///
/// Cheap to clone: internally it's just a `PgPool` handle, which is itself a
/// pooled-connection handle designed to be shared across tasks.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
    max_push_batch_size: usize,
}

impl PostgresEventStore {
    /// Wrap an existing pool. `max_push_batch_size` enforces
    /// `EventstoreConfig::max_push_batch_size`.
    #[must_use]
    pub const fn from_pool(pool: PgPool, max_push_batch_size: usize) -> Self {
        Self {
            pool,
            max_push_batch_size,
        }
    }

    /// Borrow the underlying pool, e.g. to share it with a projection store
    /// or schema loader.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl EventStore for PostgresEventStore {
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

            let mut tx = self.pool.begin().await.map_err(db_error)?;

            let current_version: i64 = sqlx::query_scalar(
                "SELECT COALESCE(MAX(aggregate_version), 0) FROM events \
                 WHERE instance_id = $1 AND aggregate_type = $2 AND aggregate_id = $3",
            )
            .bind(instance_id.as_str())
            .bind(&aggregate_type)
            .bind(aggregate_id.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;

            #[allow(clippy::cast_sign_loss)]
            let current_version = AggregateVersion::new(current_version as u64);
            if current_version != expected_version {
                return Err(EventStoreError::ConcurrencyConflict {
                    instance_id,
                    aggregate_type,
                    aggregate_id,
                    expected: expected_version,
                    actual: current_version,
                });
            }

            let position: i64 = sqlx::query_scalar("SELECT nextval('events_position_seq')")
                .fetch_one(&mut *tx)
                .await
                .map_err(db_error)?;

            let mut next_version = expected_version;
            for (i, event) in events.iter().enumerate() {
                next_version = next_version.next();
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                let in_position_order = i as i32;
                let result = sqlx::query(
                    "INSERT INTO events \
                     (instance_id, aggregate_type, aggregate_id, aggregate_version, \
                      global_position, in_position_order, event_type, payload, metadata) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                )
                .bind(instance_id.as_str())
                .bind(&aggregate_type)
                .bind(aggregate_id.as_str())
                .bind(i64::try_from(next_version.value()).unwrap_or(i64::MAX))
                .bind(position)
                .bind(in_position_order)
                .bind(&event.event_type)
                .bind(&event.payload)
                .bind(&event.metadata)
                .execute(&mut *tx)
                .await;

                if let Err(err) = result {
                    if is_unique_violation(&err) {
                        return Err(EventStoreError::ConcurrencyConflict {
                            instance_id,
                            aggregate_type,
                            aggregate_id,
                            expected: expected_version,
                            actual: current_version,
                        });
                    }
                    return Err(db_error(err));
                }
            }

            tx.commit().await.map_err(db_error)?;

            tracing::debug!(
                instance_id = instance_id.as_str(),
                aggregate_type = aggregate_type.as_str(),
                aggregate_id = aggregate_id.as_str(),
                new_version = next_version.value(),
                "appended events"
            );
            metrics::counter!("eventstore.push.total").increment(1);

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
            #[allow(clippy::cast_possible_wrap)]
            let from = from_version.map_or(0_i64, |v| v.value() as i64);
            let rows = sqlx::query(
                "SELECT instance_id, aggregate_type, aggregate_id, aggregate_version, \
                        global_position, in_position_order, event_type, payload, metadata \
                 FROM events \
                 WHERE instance_id = $1 AND aggregate_type = $2 AND aggregate_id = $3 \
                   AND aggregate_version >= $4 \
                 ORDER BY aggregate_version ASC",
            )
            .bind(instance_id.as_str())
            .bind(&aggregate_type)
            .bind(aggregate_id.as_str())
            .bind(from)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

            rows.iter().map(row_to_stored_event).collect()
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
            #[allow(clippy::cast_possible_wrap)]
            let limit = i64::from(limit);
            let rows = sqlx::query(
                "SELECT instance_id, aggregate_type, aggregate_id, aggregate_version, \
                        global_position, in_position_order, event_type, payload, metadata \
                 FROM events \
                 WHERE instance_id = $1 \
                   AND (global_position, in_position_order) > ($2, $3) \
                   AND ($4::text[] IS NULL OR aggregate_type = ANY($4)) \
                   AND ($5::text[] IS NULL OR event_type = ANY($5)) \
                 ORDER BY global_position ASC, in_position_order ASC \
                 LIMIT $6",
            )
            .bind(instance_id.as_str())
            .bind(after.position())
            .bind(after.in_position_order())
            .bind(filter.aggregate_types)
            .bind(filter.event_types)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

            rows.iter().map(row_to_stored_event).collect()
        })
    }

    fn current_position(
        &self,
        instance_id: InstanceId,
    ) -> Pin<Box<dyn Future<Output = Result<GlobalPosition, EventStoreError>> + Send + '_>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT global_position, in_position_order FROM events \
                 WHERE instance_id = $1 \
                 ORDER BY global_position DESC, in_position_order DESC \
                 LIMIT 1",
            )
            .bind(instance_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

            Ok(row.map_or(GlobalPosition::BEGINNING, |r| {
                GlobalPosition::new(r.get("global_position"), r.get("in_position_order"))
            }))
        })
    }
}
