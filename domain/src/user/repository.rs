//! Typed, paginated access to the `users` projection table.
//!
//! Never touches the event log: every method here reads the read model a
//! [`super::projection::UserProjection`] maintains.

use crate::query::{Page, SortOrder};
use iamcore_core::identity::{AggregateId, InstanceId};
use sqlx::{PgPool, Row};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised while querying the users projection.
#[derive(Debug, Error)]
pub enum UserRepositoryError {
    /// The underlying database query failed.
    #[error("database error: {0}")]
    DatabaseError(String),
}

/// One row of the `users` projection.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserRecord {
    /// The aggregate id this row projects.
    pub id: String,
    /// The tenant this user belongs to.
    pub instance_id: String,
    /// Login name.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// `"active"` or `"inactive"`.
    pub state: String,
    /// The aggregate version this row was last updated from.
    pub version: i64,
}

/// Optional filters for [`UserRepository::search`]. Combine with AND; text
/// fields use case-insensitive substring match.
#[derive(Debug, Clone, Default)]
pub struct UserSearchFilter {
    /// Restrict to usernames containing this substring.
    pub username_contains: Option<String>,
    /// Restrict to emails containing this substring.
    pub email_contains: Option<String>,
    /// Restrict to this lifecycle state (`"active"`/`"inactive"`).
    pub state: Option<String>,
}

/// Read-model access to users, isolated per `instance_id`.
pub trait UserRepository: Send + Sync {
    /// Look up a user by aggregate id, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`UserRepositoryError::DatabaseError`] if the query fails.
    fn get_by_id(
        &self,
        instance_id: &InstanceId,
        id: &AggregateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UserRecord>, UserRepositoryError>> + Send + '_>>;

    /// Look up a user by its natural key (username), or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`UserRepositoryError::DatabaseError`] if the query fails.
    fn get_by_username(
        &self,
        instance_id: &InstanceId,
        username: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UserRecord>, UserRepositoryError>> + Send + '_>>;

    /// Whether `email` is already taken by another user in this instance,
    /// excluding `exclude_id` (for update flows checking against their own
    /// current value).
    ///
    /// # Errors
    ///
    /// Returns [`UserRepositoryError::DatabaseError`] if the query fails.
    fn email_taken(
        &self,
        instance_id: &InstanceId,
        email: &str,
        exclude_id: Option<&AggregateId>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, UserRepositoryError>> + Send + '_>>;

    /// Paginated, filtered search.
    ///
    /// # Errors
    ///
    /// Returns [`UserRepositoryError::DatabaseError`] if the query fails.
    fn search(
        &self,
        instance_id: &InstanceId,
        filter: &UserSearchFilter,
        sort: SortOrder,
        offset: u32,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Page<UserRecord>, UserRepositoryError>> + Send + '_>>;
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        instance_id: row.get("instance_id"),
        username: row.get("username"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        state: row.get("state"),
        version: row.get("version"),
    }
}

fn db_err(err: sqlx::Error) -> UserRepositoryError {
    UserRepositoryError::DatabaseError(err.to_string())
}

/// Postgres-backed [`UserRepository`] over the `users_projection` table.
#[derive(Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UserRepository for PostgresUserRepository {
    fn get_by_id(
        &self,
        instance_id: &InstanceId,
        id: &AggregateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UserRecord>, UserRepositoryError>> + Send + '_>>
    {
        let instance_id = instance_id.as_str().to_string();
        let id = id.as_str().to_string();
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, instance_id, username, email, first_name, last_name, state, version \
                 FROM users_projection WHERE instance_id = $1 AND id = $2",
            )
            .bind(&instance_id)
            .bind(&id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(row.as_ref().map(row_to_record))
        })
    }

    fn get_by_username(
        &self,
        instance_id: &InstanceId,
        username: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UserRecord>, UserRepositoryError>> + Send + '_>>
    {
        let instance_id = instance_id.as_str().to_string();
        let username = username.to_string();
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, instance_id, username, email, first_name, last_name, state, version \
                 FROM users_projection \
                 WHERE instance_id = $1 AND username = $2",
            )
            .bind(&instance_id)
            .bind(&username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(row.as_ref().map(row_to_record))
        })
    }

    fn email_taken(
        &self,
        instance_id: &InstanceId,
        email: &str,
        exclude_id: Option<&AggregateId>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, UserRepositoryError>> + Send + '_>> {
        let instance_id = instance_id.as_str().to_string();
        let email = email.to_string();
        let exclude_id = exclude_id.map(|id| id.as_str().to_string());
        Box::pin(async move {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(\
                    SELECT 1 FROM users_projection \
                    WHERE instance_id = $1 AND email = $2 \
                      AND ($3::text IS NULL OR id != $3))",
            )
            .bind(&instance_id)
            .bind(&email)
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
        filter: &UserSearchFilter,
        sort: SortOrder,
        offset: u32,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Page<UserRecord>, UserRepositoryError>> + Send + '_>>
    {
        let instance_id = instance_id.as_str().to_string();
        let username_contains = filter.username_contains.clone();
        let email_contains = filter.email_contains.clone();
        let state = filter.state.clone();
        let order_sql = sort.as_sql();
        Box::pin(async move {
            let query = format!(
                "SELECT id, instance_id, username, email, first_name, last_name, state, version \
                 FROM users_projection \
                 WHERE instance_id = $1 \
                   AND ($2::text IS NULL OR username ILIKE '%' || $2 || '%') \
                   AND ($3::text IS NULL OR email ILIKE '%' || $3 || '%') \
                   AND ($4::text IS NULL OR state = $4) \
                 ORDER BY username {order_sql} \
                 OFFSET $5 LIMIT $6"
            );
            let rows = sqlx::query(&query)
                .bind(&instance_id)
                .bind(&username_contains)
                .bind(&email_contains)
                .bind(&state)
                .bind(i64::from(offset))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

            let total: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM users_projection \
                 WHERE instance_id = $1 \
                   AND ($2::text IS NULL OR username ILIKE '%' || $2 || '%') \
                   AND ($3::text IS NULL OR email ILIKE '%' || $3 || '%') \
                   AND ($4::text IS NULL OR state = $4)",
            )
            .bind(&instance_id)
            .bind(&username_contains)
            .bind(&email_contains)
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
