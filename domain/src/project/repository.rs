//! Typed, paginated access to the `projects_projection` table.

use crate::query::{Page, SortOrder};
use iamcore_core::identity::{AggregateId, InstanceId};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised while querying the projects projection.
#[derive(Debug, Error)]
pub enum ProjectRepositoryError {
    /// The underlying database query failed.
    #[error("database error: {0}")]
    DatabaseError(String),
}

/// One row of the `projects` projection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProjectRecord {
    /// The aggregate id this row projects.
    pub id: String,
    /// The tenant this project belongs to.
    pub instance_id: String,
    /// The owning organization's aggregate id.
    pub organization_id: String,
    /// Unique slug within the owning organization.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// `"active"` or `"inactive"`.
    pub state: String,
    /// The aggregate version this row was last updated from.
    pub version: i64,
}

/// Optional filters for [`ProjectRepository::search`].
#[derive(Debug, Clone, Default)]
pub struct ProjectSearchFilter {
    /// Restrict to this owning organization.
    pub organization_id: Option<String>,
    /// Restrict to names containing this substring.
    pub name_contains: Option<String>,
    /// Restrict to this lifecycle state (`"active"`/`"inactive"`).
    pub state: Option<String>,
}

/// Read-model access to projects, isolated per `instance_id`.
pub trait ProjectRepository: Send + Sync {
    /// Look up a project by aggregate id, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectRepositoryError::DatabaseError`] if the query fails.
    fn get_by_id(
        &self,
        instance_id: &InstanceId,
        id: &AggregateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProjectRecord>, ProjectRepositoryError>> + Send + '_>>;

    /// Look up a project by its natural key (slug within an organization),
    /// or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectRepositoryError::DatabaseError`] if the query fails.
    fn get_by_slug(
        &self,
        instance_id: &InstanceId,
        organization_id: &AggregateId,
        slug: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProjectRecord>, ProjectRepositoryError>> + Send + '_>>;

    /// Whether `slug` is already taken by another project under
    /// `organization_id`, excluding `exclude_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectRepositoryError::DatabaseError`] if the query fails.
    fn slug_taken(
        &self,
        instance_id: &InstanceId,
        organization_id: &AggregateId,
        slug: &str,
        exclude_id: Option<&AggregateId>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, ProjectRepositoryError>> + Send + '_>>;

    /// Paginated, filtered search.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectRepositoryError::DatabaseError`] if the query fails.
    fn search(
        &self,
        instance_id: &InstanceId,
        filter: &ProjectSearchFilter,
        sort: SortOrder,
        offset: u32,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Page<ProjectRecord>, ProjectRepositoryError>> + Send + '_>>;
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> ProjectRecord {
    ProjectRecord {
        id: row.get("id"),
        instance_id: row.get("instance_id"),
        organization_id: row.get("organization_id"),
        slug: row.get("slug"),
        name: row.get("name"),
        state: row.get("state"),
        version: row.get("version"),
    }
}

fn db_err(err: sqlx::Error) -> ProjectRepositoryError {
    ProjectRepositoryError::DatabaseError(err.to_string())
}

/// Postgres-backed [`ProjectRepository`] over the `projects_projection`
/// table.
#[derive(Clone)]
pub struct PostgresProjectRepository {
    pool: PgPool,
}

impl PostgresProjectRepository {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ProjectRepository for PostgresProjectRepository {
    fn get_by_id(
        &self,
        instance_id: &InstanceId,
        id: &AggregateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProjectRecord>, ProjectRepositoryError>> + Send + '_>>
    {
        let instance_id = instance_id.as_str().to_string();
        let id = id.as_str().to_string();
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, instance_id, organization_id, slug, name, state, version \
                 FROM projects_projection WHERE instance_id = $1 AND id = $2",
            )
            .bind(&instance_id)
            .bind(&id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(row.as_ref().map(row_to_record))
        })
    }

    fn get_by_slug(
        &self,
        instance_id: &InstanceId,
        organization_id: &AggregateId,
        slug: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<ProjectRecord>, ProjectRepositoryError>> + Send + '_>>
    {
        let instance_id = instance_id.as_str().to_string();
        let organization_id = organization_id.as_str().to_string();
        let slug = slug.to_string();
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, instance_id, organization_id, slug, name, state, version \
                 FROM projects_projection \
                 WHERE instance_id = $1 AND organization_id = $2 AND slug = $3",
            )
            .bind(&instance_id)
            .bind(&organization_id)
            .bind(&slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(row.as_ref().map(row_to_record))
        })
    }

    fn slug_taken(
        &self,
        instance_id: &InstanceId,
        organization_id: &AggregateId,
        slug: &str,
        exclude_id: Option<&AggregateId>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, ProjectRepositoryError>> + Send + '_>> {
        let instance_id = instance_id.as_str().to_string();
        let organization_id = organization_id.as_str().to_string();
        let slug = slug.to_string();
        let exclude_id = exclude_id.map(|id| id.as_str().to_string());
        Box::pin(async move {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(\
                    SELECT 1 FROM projects_projection \
                    WHERE instance_id = $1 AND organization_id = $2 AND slug = $3 \
                      AND ($4::text IS NULL OR id != $4))",
            )
            .bind(&instance_id)
            .bind(&organization_id)
            .bind(&slug)
            .bind(&exclude_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(taken)
        })
    }

    fn search(
        &self,
        instance_id: &InstanceId,
        filter: &ProjectSearchFilter,
        sort: SortOrder,
        offset: u32,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Page<ProjectRecord>, ProjectRepositoryError>> + Send + '_>> {
        let instance_id = instance_id.as_str().to_string();
        let organization_id = filter.organization_id.clone();
        let name_contains = filter.name_contains.clone();
        let state = filter.state.clone();
        let order_sql = sort.as_sql();
        Box::pin(async move {
            let query = format!(
                "SELECT id, instance_id, organization_id, slug, name, state, version \
                 FROM projects_projection \
                 WHERE instance_id = $1 \
                   AND ($2::text IS NULL OR organization_id = $2) \
                   AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%') \
                   AND ($4::text IS NULL OR state = $4) \
                 ORDER BY name {order_sql} \
                 OFFSET $5 LIMIT $6"
            );
            let rows = sqlx::query(&query)
                .bind(&instance_id)
                .bind(&organization_id)
                .bind(&name_contains)
                .bind(&state)
                .bind(i64::from(offset))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

            let total: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM projects_projection \
                 WHERE instance_id = $1 \
                   AND ($2::text IS NULL OR organization_id = $2) \
                   AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%') \
                   AND ($4::text IS NULL OR state = $4)",
            )
            .bind(&instance_id)
            .bind(&organization_id)
            .bind(&name_contains)
            .bind(&state)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

            Ok(Page {
                items: rows.iter().map(row_to_record).collect(),
                #[allow(clippy::cast_sign_loss)]
                total: total as u64,
                offset,
                limit,
            })
        })
    }
}
