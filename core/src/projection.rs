//! Projection system for building and maintaining read models from events.
//!
//! Projections are the query side of CQRS: a [`Projection`] tails the
//! instance-wide event log in global-position order and applies each event
//! to a read model it owns. [`ProjectionCheckpoint`] persists how far a
//! projection has gotten so it can resume after a restart, and
//! [`ProjectionLock`] lets exactly one worker own a projection's catch-up
//! loop at a time across a multi-process deployment.

use crate::identity::GlobalPosition;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Error type for projection operations.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Event processing error (the projection's own handler failed).
    #[error("event processing error: {0}")]
    EventProcessing(String),

    /// Checkpoint or lock tracking error.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// A projection builds and maintains a read model from events.
///
/// # Philosophy
///
/// - **Eventually consistent**: a projection lags behind the eventstore by
///   however long its poll interval and processing take.
/// - **Rebuildable**: [`Projection::rebuild`] drops current read-model data so
///   a full replay from [`GlobalPosition::BEGINNING`] can repopulate it.
/// - **Idempotent**: `apply` may be called more than once for the same event
///   (after a crash mid-batch, before the checkpoint was advanced), so
///   handlers should use upserts rather than blind inserts.
pub trait Projection: Send + Sync {
    /// The projection's name, unique across all projections in the system.
    /// Used as the key for checkpoint and lock rows.
    fn name(&self) -> &str;

    /// Apply one event from the log to this projection's read model.
    ///
    /// Implementations typically `match` on `event.event.event_type` and
    /// ignore event types they don't care about.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::EventProcessing`] if applying the event
    /// fails; the manager records this against the projection's checkpoint
    /// and retries after backing off rather than advancing past it.
    fn apply(
        &self,
        event: &crate::event_store::StoredEvent,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Narrow which aggregate types the manager's `read_since` polling
    /// needs to fetch for this projection. `None` (the default) means the
    /// projection reads every aggregate type in the instance.
    fn subscribed_aggregate_types(&self) -> Option<Vec<String>> {
        None
    }

    /// Drop this projection's read-model data in preparation for a full
    /// replay. Default implementation is a no-op (for projections with no
    /// persistent state to clear).
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if clearing storage fails.
    fn rebuild(&self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Generic key-value storage backend for projection data that doesn't need
/// its own bespoke schema (small lookup tables, denormalized caches).
///
/// Domain projections with rich query needs (search, pagination, uniqueness
/// checks) use dedicated tables and SQL directly instead of this trait; it
/// exists for the simpler cases and for fast in-memory testing.
pub trait ProjectionStore: Send + Sync {
    /// Save projection data, upserting if the key already exists.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the write fails.
    fn save(&self, key: &str, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Get projection data by key, or `None` if no value is stored for it.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the read fails.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Delete projection data by key. Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the delete fails.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Check if projection data exists for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if the check fails.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.get(key).await?.is_some()) }
    }
}

/// Whether a projection's catch-up loop is making progress or stuck on an
/// event it can't apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProjectionStatus {
    /// The projection is caught up, or catching up without error.
    Active,
    /// The projection failed to apply an event and needs operator attention.
    Error,
}

/// A projection's durable progress through the event log.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProjectionProgress {
    /// The last global position this projection has successfully processed.
    pub position: GlobalPosition,
    /// Whether the projection is healthy.
    pub status: ProjectionStatus,
    /// How many consecutive times applying an event has failed since the
    /// last successful advance.
    pub error_count: u32,
    /// The most recent error message, if `status` is `Error`.
    pub last_error: Option<String>,
}

impl ProjectionProgress {
    /// The progress of a brand-new projection that hasn't processed
    /// anything yet.
    #[must_use]
    pub const fn fresh() -> Self {
        Self {
            position: GlobalPosition::BEGINNING,
            status: ProjectionStatus::Active,
            error_count: 0,
            last_error: None,
        }
    }
}

/// Checkpoint tracking for a projection's progress through the event log.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so it can be held as
/// `Arc<dyn ProjectionCheckpoint>` inside the projection manager.
pub trait ProjectionCheckpoint: Send + Sync {
    /// Load a projection's current progress, or `None` if it has never run.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Checkpoint`] if the read fails.
    fn load_progress(
        &self,
        instance_id: &str,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProjectionProgress>>> + Send + '_>>;

    /// Record that a projection successfully advanced to `position`,
    /// resetting its error count and marking it `Active`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Checkpoint`] if the write fails.
    fn advance(
        &self,
        instance_id: &str,
        projection_name: &str,
        position: GlobalPosition,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Record that a projection failed to apply the event at `position`,
    /// incrementing its error count without moving its checkpoint position
    /// forward. The projection only transitions to the terminal `Error`
    /// status once its error count exceeds `max_consecutive_errors`; below
    /// that threshold it stays `Active` so the manager keeps retrying
    /// silently (`last_error` is still recorded either way).
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Checkpoint`] if the write fails.
    fn record_error(
        &self,
        instance_id: &str,
        projection_name: &str,
        position: GlobalPosition,
        error: &str,
        max_consecutive_errors: u32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Reset a projection's checkpoint back to
    /// [`GlobalPosition::BEGINNING`], clearing its error state. Used
    /// alongside [`Projection::rebuild`] when rebuilding from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Checkpoint`] if the write fails.
    fn reset(
        &self,
        instance_id: &str,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// A time-boxed, renewable lock on one projection's catch-up loop, so that
/// in a multi-process deployment only one worker polls a given projection at
/// a time.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so it can be held as
/// `Arc<dyn ProjectionLock>` inside the projection manager.
pub trait ProjectionLock: Send + Sync {
    /// Attempt to acquire the lock for `projection_name`, held by `owner`
    /// for `ttl`. Returns `true` if acquired (either the lock was free, or
    /// already held by `owner` and was renewed), `false` if held by another
    /// live owner.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Checkpoint`] if the underlying storage
    /// operation fails.
    fn acquire(
        &self,
        projection_name: &str,
        owner: &str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;

    /// Release the lock for `projection_name` if currently held by `owner`.
    /// Releasing a lock not held by `owner` (or not held at all) is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Checkpoint`] if the underlying storage
    /// operation fails.
    fn release(
        &self,
        projection_name: &str,
        owner: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
