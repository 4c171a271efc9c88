//! In-memory [`ProjectionCheckpoint`] and [`ProjectionLock`] test doubles.

use iamcore_core::identity::GlobalPosition;
use iamcore_core::projection::{
    ProjectionCheckpoint, ProjectionLock, ProjectionProgress, ProjectionStatus, Result,
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// An in-memory [`ProjectionCheckpoint`], one entry per
/// `(instance_id, projection_name)`.
#[derive(Default)]
pub struct InMemoryProjectionCheckpoint {
    progress: Mutex<HashMap<(String, String), ProjectionProgress>>,
}

impl InMemoryProjectionCheckpoint {
    /// Build an empty checkpoint store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectionCheckpoint for InMemoryProjectionCheckpoint {
    fn load_progress(
        &self,
        instance_id: &str,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProjectionProgress>>> + Send + '_>> {
        let key = (instance_id.to_string(), projection_name.to_string());
        Box::pin(async move {
            let progress = self.progress.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            Ok(progress.get(&key).cloned())
        })
    }

    fn advance(
        &self,
        instance_id: &str,
        projection_name: &str,
        position: GlobalPosition,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let key = (instance_id.to_string(), projection_name.to_string());
        Box::pin(async move {
            let mut progress = self.progress.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            progress.insert(
                key,
                ProjectionProgress {
                    position,
                    status: ProjectionStatus::Active,
                    error_count: 0,
                    last_error: None,
                },
            );
            Ok(())
        })
    }

    fn record_error(
        &self,
        instance_id: &str,
        projection_name: &str,
        _position: GlobalPosition,
        error: &str,
        max_consecutive_errors: u32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let key = (instance_id.to_string(), projection_name.to_string());
        let error = error.to_string();
        Box::pin(async move {
            let mut progress = self.progress.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let entry = progress.entry(key).or_insert_with(ProjectionProgress::fresh);
            entry.error_count += 1;
            entry.last_error = Some(error);
            entry.status = if entry.error_count > max_consecutive_errors {
                ProjectionStatus::Error
            } else {
                ProjectionStatus::Active
            };
            Ok(())
        })
    }

    fn reset(
        &self,
        instance_id: &str,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let key = (instance_id.to_string(), projection_name.to_string());
        Box::pin(async move {
            let mut progress = self.progress.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            progress.insert(key, ProjectionProgress::fresh());
            Ok(())
        })
    }
}

struct LockEntry {
    owner: String,
    expires_at: Instant,
}

/// An in-memory, TTL-based [`ProjectionLock`].
#[derive(Default)]
pub struct InMemoryProjectionLock {
    locks: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryProjectionLock {
    /// Build an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProjectionLock for InMemoryProjectionLock {
    fn acquire(
        &self,
        projection_name: &str,
        owner: &str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        let owner = owner.to_string();
        Box::pin(async move {
            let mut locks = self.locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let now = Instant::now();
            let acquired = match locks.get(&projection_name) {
                Some(entry) if entry.owner != owner && entry.expires_at > now => false,
                _ => true,
            };
            if acquired {
                locks.insert(
                    projection_name,
                    LockEntry { owner, expires_at: now + ttl },
                );
            }
            Ok(acquired)
        })
    }

    fn release(
        &self,
        projection_name: &str,
        owner: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        let owner = owner.to_string();
        Box::pin(async move {
            let mut locks = self.locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let std::collections::hash_map::Entry::Occupied(entry) = locks.entry(projection_name) {
                if entry.get().owner == owner {
                    entry.remove();
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checkpoint_round_trips_progress() {
        let checkpoint = InMemoryProjectionCheckpoint::new();
        assert!(checkpoint.load_progress("acme", "things").await.expect("load").is_none());

        checkpoint
            .advance("acme", "things", GlobalPosition::new(3, 0))
            .await
            .expect("advance");

        let progress = checkpoint
            .load_progress("acme", "things")
            .await
            .expect("load")
            .expect("progress recorded");
        assert_eq!(progress.position, GlobalPosition::new(3, 0));
        assert_eq!(progress.status, ProjectionStatus::Active);
    }

    #[tokio::test]
    async fn record_error_increments_error_count_without_moving_position() {
        let checkpoint = InMemoryProjectionCheckpoint::new();
        checkpoint
            .advance("acme", "things", GlobalPosition::new(3, 0))
            .await
            .expect("advance");
        checkpoint
            .record_error("acme", "things", GlobalPosition::new(4, 0), "boom", 10)
            .await
            .expect("record_error");

        let progress = checkpoint
            .load_progress("acme", "things")
            .await
            .expect("load")
            .expect("progress recorded");
        assert_eq!(progress.position, GlobalPosition::new(3, 0));
        assert_eq!(progress.error_count, 1);
    }

    #[tokio::test]
    async fn record_error_stays_active_below_threshold() {
        let checkpoint = InMemoryProjectionCheckpoint::new();
        checkpoint
            .record_error("acme", "things", GlobalPosition::new(1, 0), "boom", 3)
            .await
            .expect("record_error");

        let progress = checkpoint
            .load_progress("acme", "things")
            .await
            .expect("load")
            .expect("progress recorded");
        assert_eq!(progress.error_count, 1);
        assert_eq!(progress.status, ProjectionStatus::Active);
    }

    #[tokio::test]
    async fn record_error_trips_to_error_once_threshold_exceeded() {
        let checkpoint = InMemoryProjectionCheckpoint::new();
        for _ in 0..3 {
            checkpoint
                .record_error("acme", "things", GlobalPosition::new(1, 0), "boom", 3)
                .await
                .expect("record_error");
        }
        let progress = checkpoint
            .load_progress("acme", "things")
            .await
            .expect("load")
            .expect("progress recorded");
        assert_eq!(progress.error_count, 3);
        assert_eq!(progress.status, ProjectionStatus::Active);

        checkpoint
            .record_error("acme", "things", GlobalPosition::new(1, 0), "boom", 3)
            .await
            .expect("record_error");
        let progress = checkpoint
            .load_progress("acme", "things")
            .await
            .expect("load")
            .expect("progress recorded");
        assert_eq!(progress.error_count, 4);
        assert_eq!(progress.status, ProjectionStatus::Error);
    }

    #[tokio::test]
    async fn lock_excludes_other_owners_until_expiry() {
        let lock = InMemoryProjectionLock::new();
        assert!(lock.acquire("things", "worker-1", Duration::from_secs(30)).await.expect("acquire"));
        assert!(!lock.acquire("things", "worker-2", Duration::from_secs(30)).await.expect("acquire"));
        assert!(lock.acquire("things", "worker-1", Duration::from_secs(30)).await.expect("renew"));

        lock.release("things", "worker-1").await.expect("release");
        assert!(lock.acquire("things", "worker-2", Duration::from_secs(30)).await.expect("acquire after release"));
    }
}
