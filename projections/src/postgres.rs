//! `Postgres`-backed [`ProjectionCheckpoint`] and [`ProjectionLock`]
//! implementations, against the `projection_states`/`projection_locks`
//! tables [`iamcore_postgres::CORE_MIGRATIONS`] provisions.

use chrono::{Duration as ChronoDuration, Utc};
use iamcore_core::identity::GlobalPosition;
use iamcore_core::projection::{
    ProjectionCheckpoint, ProjectionError, ProjectionLock, ProjectionProgress, ProjectionStatus,
    Result,
};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

fn db_err(err: sqlx::Error) -> ProjectionError {
    ProjectionError::Checkpoint(err.to_string())
}

/// Durable checkpoint tracking for projection progress, one row per
/// `(instance_id, projection_name)`.
#[derive(Clone)]
pub struct PostgresProjectionCheckpoint {
    pool: PgPool,
}

impl PostgresProjectionCheckpoint {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ProjectionCheckpoint for PostgresProjectionCheckpoint {
    fn load_progress(
        &self,
        instance_id: &str,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProjectionProgress>>> + Send + '_>> {
        let instance_id = instance_id.to_string();
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT global_position, in_position_order, status, error_count, last_error \
                 FROM projection_states WHERE instance_id = $1 AND projection_name = $2",
            )
            .bind(&instance_id)
            .bind(&projection_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

            Ok(row.map(|r| {
                let status: String = r.get("status");
                ProjectionProgress {
                    position: GlobalPosition::new(
                        r.get("global_position"),
                        r.get("in_position_order"),
                    ),
                    status: if status == "error" {
                        ProjectionStatus::Error
                    } else {
                        ProjectionStatus::Active
                    },
                    #[allow(clippy::cast_sign_loss)]
                    error_count: r.get::<i32, _>("error_count") as u32,
                    last_error: r.get("last_error"),
                }
            }))
        })
    }

    fn advance(
        &self,
        instance_id: &str,
        projection_name: &str,
        position: GlobalPosition,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let instance_id = instance_id.to_string();
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO projection_states \
                   (instance_id, projection_name, global_position, in_position_order, status, error_count, last_error) \
                 VALUES ($1, $2, $3, $4, 'active', 0, NULL) \
                 ON CONFLICT (instance_id, projection_name) DO UPDATE \
                 SET global_position = EXCLUDED.global_position, \
                     in_position_order = EXCLUDED.in_position_order, \
                     status = 'active', error_count = 0, last_error = NULL, \
                     updated_at = now()",
            )
            .bind(&instance_id)
            .bind(&projection_name)
            .bind(position.position())
            .bind(position.in_position_order())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn record_error(
        &self,
        instance_id: &str,
        projection_name: &str,
        position: GlobalPosition,
        error: &str,
        max_consecutive_errors: u32,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let instance_id = instance_id.to_string();
        let projection_name = projection_name.to_string();
        let error = error.to_string();
        #[allow(clippy::cast_possible_wrap)]
        let threshold = max_consecutive_errors as i32;
        Box::pin(async move {
            // The projection only trips to the terminal 'error' status once
            // its error count exceeds the configured threshold; below that
            // it stays 'active' so the manager keeps retrying silently.
            sqlx::query(
                "INSERT INTO projection_states \
                   (instance_id, projection_name, global_position, in_position_order, status, error_count, last_error) \
                 VALUES ($1, $2, 0, 0, CASE WHEN 1 > $4 THEN 'error' ELSE 'active' END, 1, $3) \
                 ON CONFLICT (instance_id, projection_name) DO UPDATE \
                 SET status = CASE WHEN projection_states.error_count + 1 > $4 THEN 'error' ELSE 'active' END, \
                     error_count = projection_states.error_count + 1, \
                     last_error = EXCLUDED.last_error, \
                     updated_at = now()",
            )
            .bind(&instance_id)
            .bind(&projection_name)
            .bind(&error)
            .bind(threshold)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            // The position the failing event sat at is intentionally not
            // written here: the checkpoint must stay at the last *successful*
            // position so the next poll re-fetches and retries the same event.
            let _ = position;
            Ok(())
        })
    }

    fn reset(
        &self,
        instance_id: &str,
        projection_name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let instance_id = instance_id.to_string();
        let projection_name = projection_name.to_string();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO projection_states \
                   (instance_id, projection_name, global_position, in_position_order, status, error_count, last_error) \
                 VALUES ($1, $2, 0, 0, 'active', 0, NULL) \
                 ON CONFLICT (instance_id, projection_name) DO UPDATE \
                 SET global_position = 0, in_position_order = 0, status = 'active', \
                     error_count = 0, last_error = NULL, updated_at = now()",
            )
            .bind(&instance_id)
            .bind(&projection_name)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(())
        })
    }
}

/// A TTL-based row lock over `projection_locks`, letting exactly one worker
/// own a projection's catch-up loop at a time across a multi-process
/// deployment.
#[derive(Clone)]
pub struct PostgresProjectionLock {
    pool: PgPool,
}

impl PostgresProjectionLock {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ProjectionLock for PostgresProjectionLock {
    fn acquire(
        &self,
        projection_name: &str,
        owner: &str,
        ttl: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        let projection_name = projection_name.to_string();
        let owner = owner.to_string();
        #[allow(clippy::cast_possible_wrap)]
        let ttl_ms = ttl.as_millis() as i64;
        Box::pin(async move {
            let expires_at = Utc::now() + ChronoDuration::milliseconds(ttl_ms);

            let result = sqlx::query(
                "INSERT INTO projection_locks (projection_name, owner, expires_at) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (projection_name) DO UPDATE \
                 SET owner = EXCLUDED.owner, expires_at = EXCLUDED.expires_at \
                 WHERE projection_locks.owner = EXCLUDED.owner \
                    OR projection_locks.expires_at < now()",
            )
            .bind(&projection_name)
            .bind(&owner)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            Ok(result.rows_affected() > 0)
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
            sqlx::query("DELETE FROM projection_locks WHERE projection_name = $1 AND owner = $2")
                .bind(&projection_name)
                .bind(&owner)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(())
        })
    }
}
