//! `ProjectionManager` for orchestrating projection updates from the
//! eventstore.
//!
//! # Overview
//!
//! The `ProjectionManager` coordinates the lifecycle of a projection:
//! - Acquires a time-boxed, renewable lock so exactly one worker catches a
//!   projection up at a time across a multi-process deployment.
//! - Polls `EventStore::read_since` from the projection's last saved
//!   position.
//! - Dispatches each event to the projection's `apply`, advancing the
//!   checkpoint one event at a time so a crash mid-batch only reprocesses
//!   events already applied (idempotent upserts absorb the replay).
//! - Tracks error state per spec: a failing event backs the loop off and
//!   retries rather than skipping it or crashing the process.
//! - Supports `rebuild`: clear the projection's data, reset its checkpoint,
//!   and replay the whole log synchronously under the same lock.
//!
//! # Example
//!
//! ```ignore
//! use iamcore_projections::ProjectionManager;
//!
//! let (mut manager, shutdown) = ProjectionManager::new(
//!     my_projection,
//!     event_store,
//!     checkpoint,
//!     lock,
//!     instance_id,
//!     "worker-1",
//!     ProjectionConfig::default(),
//! );
//!
//! tokio::spawn(async move { manager.run().await });
//!
//! // Later, to stop:
//! shutdown.send(true).ok();
//! ```

use iamcore_core::config::ProjectionConfig;
use iamcore_core::event_store::{EventStore, ReadSinceFilter};
use iamcore_core::identity::InstanceId;
use iamcore_core::projection::{
    Projection, ProjectionCheckpoint, ProjectionError, ProjectionLock, ProjectionProgress, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Orchestrates one projection's catch-up loop against the eventstore.
///
/// # Type Parameters
///
/// - `P`: the projection being driven.
pub struct ProjectionManager<P>
where
    P: Projection,
{
    projection: Arc<P>,
    event_store: Arc<dyn EventStore>,
    checkpoint: Arc<dyn ProjectionCheckpoint>,
    lock: Arc<dyn ProjectionLock>,
    instance_id: InstanceId,
    owner: String,
    config: ProjectionConfig,
    shutdown: watch::Receiver<bool>,
}

impl<P> ProjectionManager<P>
where
    P: Projection,
{
    /// Construct a manager for `projection`, returning it alongside a
    /// shutdown sender. Sending `true` on the sender causes the next `run`
    /// loop iteration to finish its current batch, release the lock, and
    /// return.
    #[must_use]
    pub fn new(
        projection: P,
        event_store: Arc<dyn EventStore>,
        checkpoint: Arc<dyn ProjectionCheckpoint>,
        lock: Arc<dyn ProjectionLock>,
        instance_id: InstanceId,
        owner: impl Into<String>,
        config: ProjectionConfig,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = Self {
            projection: Arc::new(projection),
            event_store,
            checkpoint,
            lock,
            instance_id,
            owner: owner.into(),
            config,
            shutdown: shutdown_rx,
        };
        (manager, shutdown_tx)
    }

    /// Run the catch-up loop until a shutdown signal is received.
    ///
    /// Each iteration renews the projection's lock, polls for a batch of
    /// new events, and applies them one at a time, advancing the checkpoint
    /// after each successful apply. When a batch is empty (the projection
    /// is caught up) or the lock is held by another worker, the loop sleeps
    /// for `poll_interval_ms` before trying again.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] only if the lock or checkpoint storage
    /// itself is unreachable; a failing `Projection::apply` is recorded via
    /// [`ProjectionCheckpoint::record_error`] and retried rather than
    /// propagated.
    pub async fn run(&mut self) -> Result<()> {
        let name = self.projection.name().to_string();
        let ttl = Duration::from_millis(self.config.lock_ttl_ms);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        tracing::info!(projection = %name, owner = %self.owner, "starting projection manager");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let acquired = self.lock.acquire(&name, &self.owner, ttl).await?;
            if !acquired {
                tracing::debug!(projection = %name, "lock held by another worker, backing off");
                self.wait(poll_interval).await;
                continue;
            }

            match self.catch_up_batch(&name).await {
                Ok(0) => self.wait(poll_interval).await,
                Ok(processed) => {
                    tracing::debug!(projection = %name, processed, "applied batch");
                },
                Err(err) => {
                    tracing::error!(projection = %name, error = %err, "projection batch failed");
                    self.wait(poll_interval).await;
                },
            }
        }

        self.lock.release(&name, &self.owner).await?;
        tracing::info!(projection = %name, "projection manager stopped");
        Ok(())
    }

    /// Drop the projection's data, reset its checkpoint, and replay the
    /// entire log synchronously. Requires acquiring the projection's lock
    /// so a rebuild can never run concurrently with ordinary catch-up.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Checkpoint`] if the lock cannot be
    /// acquired, or whatever error `rebuild`/`apply` produce otherwise.
    pub async fn rebuild(&self) -> Result<()> {
        let name = self.projection.name().to_string();
        let ttl = Duration::from_millis(self.config.lock_ttl_ms);

        let acquired = self.lock.acquire(&name, &self.owner, ttl).await?;
        if !acquired {
            return Err(ProjectionError::Checkpoint(format!(
                "could not acquire lock to rebuild projection {name}"
            )));
        }

        tracing::info!(projection = %name, "rebuilding projection");
        self.projection.rebuild().await?;
        self.checkpoint.reset(self.instance_id.as_str(), &name).await?;

        loop {
            let processed = self.catch_up_batch(&name).await?;
            if processed == 0 {
                break;
            }
        }

        self.lock.release(&name, &self.owner).await?;
        tracing::info!(projection = %name, "projection rebuilt");
        Ok(())
    }

    async fn wait(&mut self, interval: Duration) {
        tokio::select! {
            () = tokio::time::sleep(interval) => {},
            _ = self.shutdown.changed() => {},
        }
    }

    /// Poll one batch of events and apply them, returning how many were
    /// successfully processed.
    async fn catch_up_batch(&self, name: &str) -> Result<usize> {
        let progress = self
            .checkpoint
            .load_progress(self.instance_id.as_str(), name)
            .await?
            .unwrap_or_else(ProjectionProgress::fresh);

        let filter = ReadSinceFilter {
            aggregate_types: self.projection.subscribed_aggregate_types(),
            event_types: None,
        };

        let events = self
            .event_store
            .read_since(
                self.instance_id.clone(),
                progress.position,
                self.config.batch_size,
                filter,
            )
            .await
            .map_err(|e| ProjectionError::Storage(e.to_string()))?;

        if events.is_empty() {
            return Ok(0);
        }

        for event in &events {
            if let Err(err) = self.projection.apply(event).await {
                self.checkpoint
                    .record_error(
                        self.instance_id.as_str(),
                        name,
                        event.global_position,
                        &err.to_string(),
                        self.config.max_consecutive_errors,
                    )
                    .await?;
                return Err(err);
            }
            self.checkpoint
                .advance(self.instance_id.as_str(), name, event.global_position)
                .await?;
        }

        metrics::counter!("projection.events_applied.total").increment(events.len() as u64);
        Ok(events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamcore_core::event::SerializedEvent;
    use iamcore_core::event_store::StoredEvent;
    use iamcore_core::identity::{AggregateId, AggregateVersion, GlobalPosition};
    use iamcore_testing::{InMemoryEventStore, InMemoryProjectionCheckpoint, InMemoryProjectionLock};
    use std::sync::Mutex;

    struct CountingProjection {
        name: &'static str,
        applied: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl CountingProjection {
        fn new(name: &'static str) -> Self {
            Self { name, applied: Mutex::new(Vec::new()), fail_on: None }
        }

        fn failing_on(name: &'static str, event_type: &str) -> Self {
            Self { name, applied: Mutex::new(Vec::new()), fail_on: Some(event_type.to_string()) }
        }
    }

    impl Projection for CountingProjection {
        fn name(&self) -> &str {
            self.name
        }

        async fn apply(&self, event: &StoredEvent) -> Result<()> {
            if self.fail_on.as_deref() == Some(event.event.event_type.as_str()) {
                return Err(ProjectionError::EventProcessing("boom".to_string()));
            }
            self.applied.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(event.event.event_type.clone());
            Ok(())
        }

        async fn rebuild(&self) -> Result<()> {
            self.applied.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clear();
            Ok(())
        }
    }

    async fn seed(store: &InMemoryEventStore, instance: &InstanceId, n: usize) {
        for i in 0..n {
            store
                .push(
                    instance.clone(),
                    "thing".to_string(),
                    AggregateId::new(format!("t-{i}")),
                    AggregateVersion::NONE,
                    vec![SerializedEvent::new(
                        "thing.created.v1".to_string(),
                        serde_json::json!({ "i": i }),
                        None,
                    )],
                )
                .await
                .expect("seed push succeeds");
        }
    }

    #[tokio::test]
    async fn catch_up_batch_processes_all_seeded_events() {
        let instance = InstanceId::new("acme");
        let store = Arc::new(InMemoryEventStore::new());
        seed(&store, &instance, 5).await;

        let checkpoint = Arc::new(InMemoryProjectionCheckpoint::new());
        let lock = Arc::new(InMemoryProjectionLock::new());
        let projection = CountingProjection::new("things");

        let (manager, _shutdown) = ProjectionManager::new(
            projection,
            store,
            checkpoint.clone(),
            lock,
            instance.clone(),
            "worker-1",
            ProjectionConfig::default(),
        );

        let processed = manager.catch_up_batch("things").await.expect("batch succeeds");
        assert_eq!(processed, 5);

        let progress = checkpoint
            .load_progress(instance.as_str(), "things")
            .await
            .expect("load succeeds")
            .expect("progress recorded");
        assert_eq!(progress.position, GlobalPosition::new(5, 0));
    }

    #[tokio::test]
    async fn second_batch_after_full_catch_up_is_empty() {
        let instance = InstanceId::new("acme");
        let store = Arc::new(InMemoryEventStore::new());
        seed(&store, &instance, 2).await;

        let checkpoint = Arc::new(InMemoryProjectionCheckpoint::new());
        let lock = Arc::new(InMemoryProjectionLock::new());
        let projection = CountingProjection::new("things");

        let (manager, _shutdown) = ProjectionManager::new(
            projection,
            store,
            checkpoint,
            lock,
            instance,
            "worker-1",
            ProjectionConfig::default(),
        );

        assert_eq!(manager.catch_up_batch("things").await.expect("first batch"), 2);
        assert_eq!(manager.catch_up_batch("things").await.expect("second batch"), 0);
    }

    #[tokio::test]
    async fn rebuild_requires_the_lock() {
        let instance = InstanceId::new("acme");
        let store = Arc::new(InMemoryEventStore::new());
        seed(&store, &instance, 3).await;

        let checkpoint = Arc::new(InMemoryProjectionCheckpoint::new());
        let lock = Arc::new(InMemoryProjectionLock::new());
        // Another worker is already holding the lock.
        lock.acquire("things", "worker-other", Duration::from_secs(30)).await.expect("acquire");

        let projection = CountingProjection::new("things");
        let (manager, _shutdown) = ProjectionManager::new(
            projection,
            store,
            checkpoint,
            lock,
            instance,
            "worker-1",
            ProjectionConfig::default(),
        );

        let result = manager.rebuild().await;
        assert!(matches!(result, Err(ProjectionError::Checkpoint(_))));
    }

    #[tokio::test]
    async fn projection_only_trips_to_error_after_exceeding_max_consecutive_errors() {
        let instance = InstanceId::new("acme");
        let store = Arc::new(InMemoryEventStore::new());
        seed(&store, &instance, 1).await;

        let checkpoint = Arc::new(InMemoryProjectionCheckpoint::new());
        let lock = Arc::new(InMemoryProjectionLock::new());
        let projection = CountingProjection::failing_on("things", "thing.created.v1");

        let config = ProjectionConfig { max_consecutive_errors: 2, ..ProjectionConfig::default() };
        let (manager, _shutdown) = ProjectionManager::new(
            projection,
            store,
            checkpoint.clone(),
            lock,
            instance.clone(),
            "worker-1",
            config,
        );

        for _ in 0..2 {
            assert!(manager.catch_up_batch("things").await.is_err());
        }
        let progress = checkpoint
            .load_progress(instance.as_str(), "things")
            .await
            .expect("load succeeds")
            .expect("progress recorded");
        assert_eq!(progress.error_count, 2);
        assert_eq!(progress.status, iamcore_core::projection::ProjectionStatus::Active);

        assert!(manager.catch_up_batch("things").await.is_err());
        let progress = checkpoint
            .load_progress(instance.as_str(), "things")
            .await
            .expect("load succeeds")
            .expect("progress recorded");
        assert_eq!(progress.error_count, 3);
        assert_eq!(progress.status, iamcore_core::projection::ProjectionStatus::Error);
    }
}
