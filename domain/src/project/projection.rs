//! Maintains the `projects_projection` read model from the project event
//! stream.

use super::events::ProjectEvent;
use iamcore_core::event_store::StoredEvent;
use iamcore_core::projection::{Projection, ProjectionError, Result};
use sqlx::PgPool;

/// Upserts `projects_projection` rows from `project.*` events.
pub struct ProjectProjection {
    pool: PgPool,
}

impl ProjectProjection {
    /// Construct a projection writing into `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Projection for ProjectProjection {
    fn name(&self) -> &str {
        "project_projection"
    }

    async fn apply(&self, event: &StoredEvent) -> Result<()> {
        let decoded = ProjectEvent::decode(&event.event.event_type, &event.event.payload)
            .map_err(|e| ProjectionError::EventProcessing(e.to_string()))?;

        match decoded {
            ProjectEvent::Created {
                organization_id,
                slug,
                name,
            } => {
                sqlx::query(
                    "INSERT INTO projects_projection \
                        (id, instance_id, organization_id, slug, name, state, version) \
                     VALUES ($1, $2, $3, $4, $5, 'active', $6) \
                     ON CONFLICT (instance_id, id) DO UPDATE SET \
                        organization_id = EXCLUDED.organization_id, \
                        slug = EXCLUDED.slug, \
                        name = EXCLUDED.name, \
                        state = 'active', \
                        version = EXCLUDED.version \
                     WHERE projects_projection.version < EXCLUDED.version",
                )
                .bind(event.aggregate_id.as_str())
                .bind(event.instance_id.as_str())
                .bind(&organization_id)
                .bind(&slug)
                .bind(&name)
                .bind(i64::try_from(event.aggregate_version.value()).unwrap_or(i64::MAX))
                .execute(&self.pool)
                .await
                .map_err(|e| ProjectionError::Storage(e.to_string()))?;
            },
            ProjectEvent::Updated { name } => {
                sqlx::query(
                    "UPDATE projects_projection SET name = $3, version = $4 \
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
            ProjectEvent::Deactivated => {
                sqlx::query(
                    "UPDATE projects_projection SET state = 'inactive', version = $3 \
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
        Some(vec!["project".to_string()])
    }

    async fn rebuild(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE projects_projection")
            .execute(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(e.to_string()))?;
        Ok(())
    }
}
