//! Maintains the `users_projection` read model from the user event stream.

use super::events::UserEvent;
use iamcore_core::event_store::StoredEvent;
use iamcore_core::projection::{Projection, ProjectionError, Result};
use sqlx::PgPool;

/// Upserts `users_projection` rows from `user.*` events.
pub struct UserProjection {
    pool: PgPool,
}

impl UserProjection {
    /// Construct a projection writing into `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Projection for UserProjection {
    fn name(&self) -> &str {
        "user_projection"
    }

    async fn apply(&self, event: &StoredEvent) -> Result<()> {
        let decoded = UserEvent::decode(&event.event.event_type, &event.event.payload)
            .map_err(|e| ProjectionError::EventProcessing(e.to_string()))?;

        match decoded {
            UserEvent::Created {
                username,
                email,
                first_name,
                last_name,
            } => {
                sqlx::query(
                    "INSERT INTO users_projection \
                        (id, instance_id, username, email, first_name, last_name, state, version) \
                     VALUES ($1, $2, $3, $4, $5, $6, 'active', $7) \
                     ON CONFLICT (instance_id, id) DO UPDATE SET \
                        username = EXCLUDED.username, \
                        email = EXCLUDED.email, \
                        first_name = EXCLUDED.first_name, \
                        last_name = EXCLUDED.last_name, \
                        state = 'active', \
                        version = EXCLUDED.version \
                     WHERE users_projection.version < EXCLUDED.version",
                )
                .bind(event.aggregate_id.as_str())
                .bind(event.instance_id.as_str())
                .bind(&username)
                .bind(&email)
                .bind(&first_name)
                .bind(&last_name)
                .bind(i64::try_from(event.aggregate_version.value()).unwrap_or(i64::MAX))
                .execute(&self.pool)
                .await
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;
            },
            UserEvent::Updated {
                email,
                first_name,
                last_name,
            } => {
                sqlx::query(
                    "UPDATE users_projection SET \
                        email = COALESCE($3, email), \
                        first_name = COALESCE($4, first_name), \
                        last_name = COALESCE($5, last_name), \
                        version = $6 \
                     WHERE instance_id = $1 AND id = $2 AND version < $6",
                )
                .bind(event.instance_id.as_str())
                .bind(event.aggregate_id.as_str())
                .bind(&email)
                .bind(&first_name)
                .bind(&last_name)
                .bind(i64::try_from(event.aggregate_version.value()).unwrap_or(i64::MAX))
                .execute(&self.pool)
                .await
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;
            },
            UserEvent::Deactivated => {
                sqlx::query(
                    "UPDATE users_projection SET state = 'inactive', version = $3 \
                     WHERE instance_id = $1 AND id = $2 AND version < $3",
                )
                .bind(event.instance_id.as_str())
                .bind(event.aggregate_id.as_str())
                .bind(i64::try_from(event.aggregate_version.value()).unwrap_or(i64::MAX))
                .execute(&self.pool)
                .await
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;
            },
        }

        Ok(())
    }

    fn subscribed_aggregate_types(&self) -> Option<Vec<String>> {
        Some(vec!["user".to_string()])
    }

    async fn rebuild(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE users_projection")
            .execute(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(e.to_string()))?;
        Ok(())
    }
}
