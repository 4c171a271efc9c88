//! Maintains the `organizations_projection` read model from the
//! organization event stream.

use super::events::OrganizationEvent;
use iamcore_core::event_store::StoredEvent;
use iamcore_core::projection::{Projection, ProjectionError, Result};
use sqlx::PgPool;

/// Upserts `organizations_projection` rows from `organization.*` events.
pub struct OrganizationProjection {
    pool: PgPool,
}

impl OrganizationProjection {
    /// Construct a projection writing into `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Projection for OrganizationProjection {
    fn name(&self) -> &str {
        "organization_projection"
    }

    async fn apply(&self, event: &StoredEvent) -> Result<()> {
        let decoded = OrganizationEvent::decode(&event.event.event_type, &event.event.payload)
            .map_err(|e| ProjectionError::EventProcessing(e.to_string()))?;

        match decoded {
            OrganizationEvent::Created { slug, name } => {
                sqlx::query(
                    "INSERT INTO organizations_projection \
                        (id, instance_id, slug, name, state, version) \
                     VALUES ($1, $2, $3, $4, 'active', $5) \
                     ON CONFLICT (instance_id, id) DO UPDATE SET \
                        slug = EXCLUDED.slug, \
                        name = EXCLUDED.name, \
                        state = 'active', \
                        version = EXCLUDED.version \
                     WHERE organizations_projection.version < EXCLUDED.version",
                )
                .bind(event.aggregate_id.as_str())
                .bind(event.instance_id.as_str())
                .bind(&slug)
                .bind(&name)
                .bind(i64::try_from(event.aggregate_version.value()).unwrap_or(i64::MAX))
                .execute(&self.pool)
                .await
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;
            },
            OrganizationEvent::Updated { name } => {
                sqlx::query(
                    "UPDATE organizations_projection SET name = $3, version = $4 \
                     WHERE instance_id = $1 AND id = $2 AND version < $4",
                )
                .bind(event.instance_id.as_str())
                .bind(event.aggregate_id.as_str())
                .bind(&name)
                .bind(i64::try_from(event.aggregate_version.value()).unwrap_or(i64::MAX))
                .execute(&self.pool)
                .await
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;
            },
            OrganizationEvent::Deactivated => {
                sqlx::query(
                    "UPDATE organizations_projection SET state = 'inactive', version = $3 \
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
        Some(vec!["organization".to_string()])
    }

    async fn rebuild(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE organizations_projection")
            .execute(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(e.to_string()))?;
        Ok(())
    }
}
