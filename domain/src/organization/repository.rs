//! Typed, paginated access to the `organizations_projection` table.

use crate::query::{Page, SortOrder};
use iamcore_core::identity::{AggregateId, InstanceId};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised while querying the organizations projection.
#[derive(Debug, Error)]
pub enum OrganizationRepositoryError {
    /// The underlying database query failed.
    #[error("database error: {0}")]
    DatabaseError(String),
}

/// One row of the `organizations` projection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OrganizationRecord {
    /// The aggregate id this row projects.
    pub id: String,
    /// The tenant this organization belongs to.
    pub instance_id: String,
    /// Unique slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// `"active"` or `"inactive"`.
    pub state: String,
    /// The aggregate version this row was last updated from.
    pub version: i64,
}

/// Optional filters for [`OrganizationRepository::search`].
#[derive(Debug, Clone, Default)]
pub struct OrganizationSearchFilter {
    /// Restrict to names containing this substring.
    pub name_contains: Option<String>,
    /// Restrict to this lifecycle state (`"active"`/`"inactive"`).
    pub state: Option<String>,
}

/// Read-model access to organizations, isolated per `instance_id`.
pub trait OrganizationRepository: Send + Sync {
    /// Look up an organization by aggregate id, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationRepositoryError::DatabaseError`] if the query fails.
    fn get_by_id(
        &self,
        instance_id: &InstanceId,
        id: &AggregateId,
    ) -> Pin<
        Box<dyn Future<Output = Result<Option<OrganizationRecord>, OrganizationRepositoryError>> + Send + '_>,
    >;

    /// Look up an organization by its natural key (slug), or `None` if
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationRepositoryError::DatabaseError`] if the query fails.
    fn get_by_slug(
        &self,
        instance_id: &InstanceId,
        slug: &str,
    ) -> Pin<
        Box<dyn Future<Output = Result<Option<OrganizationRecord>, OrganizationRepositoryError>> + Send + '_>,
    >;

    /// Whether `slug` is already taken by another organization in this
    /// instance, excluding `exclude_id`.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationRepositoryError::DatabaseError`] if the query fails.
    fn slug_taken(
        &self,
        instance_id: &InstanceId,
        slug: &str,
        exclude_id: Option<&AggregateId>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, OrganizationRepositoryError>> + Send + '_>>;

    /// Paginated, filtered search.
    ///
    /// # Errors
    ///
    /// Returns [`OrganizationRepositoryError::DatabaseError`] if the query fails.
    fn search(
        &self,
        instance_id: &InstanceId,
        filter: &OrganizationSearchFilter,
        sort: SortOrder,
        offset: u32,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Page<OrganizationRecord>, OrganizationRepositoryError>> + Send + '_>>;
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> OrganizationRecord {
    OrganizationRecord {
        id: row.get("id"),
        instance_id: row.get("instance_id"),
        slug: row.get("slug"),
        name: row.get("name"),
        state: row.get("state"),
        version: row.get("version"),
    }
}

fn db_err(err: sqlx::Error) -> OrganizationRepositoryError {
    OrganizationRepositoryError::DatabaseError(err.to_string())
}

/// Postgres-backed [`OrganizationRepository`] over the
/// `organizations_projection` table.
#[derive(Clone)]
pub struct PostgresOrganizationRepository {
    pool: PgPool,
}

impl PostgresOrganizationRepository {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl OrganizationRepository for PostgresOrganizationRepository {
    fn get_by_id(
        &self,
        instance_id: &InstanceId,
        id: &AggregateId,
    ) -> Pin<
        Box<dyn Future<Output = Result<Option<OrganizationRecord>, OrganizationRepositoryError>> + Send + '_>,
    > {
        let instance_id = instance_id.as_str().to_string();
        let id = id.as_str().to_string();
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, instance_id, slug, name, state, version \
                 FROM organizations_projection WHERE instance_id = $1 AND id = $2",
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
        slug: &str,
    ) -> Pin<
        Box<dyn Future<Output = Result<Option<OrganizationRecord>, OrganizationRepositoryError>> + Send + '_>,
    > {
        let instance_id = instance_id.as_str().to_string();
        let slug = slug.to_string();
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, instance_id, slug, name, state, version \
                 FROM organizations_projection WHERE instance_id = $1 AND slug = $2",
            )
            .bind(&instance_id)
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
        slug: &str,
        exclude_id: Option<&AggregateId>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, OrganizationRepositoryError>> + Send + '_>> {
        let instance_id = instance_id.as_str().to_string();
        let slug = slug.to_string();
        let exclude_id = exclude_id.map(|id| id.as_str().to_string());
        Box::pin(async move {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(\
                    SELECT 1 FROM organizations_projection \
                    WHERE instance_id = $1 AND slug = $2 \
                      AND ($3::text IS NULL OR id != $3))",
            )
            .bind(&instance_id)
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
        filter: &OrganizationSearchFilter,
        sort: SortOrder,
        offset: u32,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Page<OrganizationRecord>, OrganizationRepositoryError>> + Send + '_>>
    {
        let instance_id = instance_id.as_str().to_string();
        let name_contains = filter.name_contains.clone();
        let state = filter.state.clone();
        let order_sql = sort.as_sql();
        Box::pin(async move {
            let query = format!(
                "SELECT id, instance_id, slug, name, state, version \
                 FROM organizations_projection \
                 WHERE instance_id = $1 \
                   AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%') \
                   AND ($3::text IS NULL OR state = $3) \
                 ORDER BY name {order_sql} \
                 OFFSET $4 LIMIT $5"
            );
            let rows = sqlx::query(&query)
                .bind(&instance_id)
                .bind(&name_contains)
                .bind(&state)
                .bind(i64::from(offset))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

            let total: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM organizations_projection \
                 WHERE instance_id = $1 \
                   AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%') \
                   AND ($3::text IS NULL OR state = $3)",
            )
            .bind(&instance_id)
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
