//! Connection pool construction and a transaction-scope helper.

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use iamcore_core::config::DatabaseConfig;

/// Errors building or using a connection pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to establish the pool.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// The closure passed to [`with_transaction`] returned an error.
    #[error("transaction failed: {0}")]
    Transaction(String),
}

/// Build a [`PgPool`] from a [`DatabaseConfig`].
///
/// # Errors
///
/// Returns [`PoolError::Connect`] if the pool cannot be established within
/// `connect_timeout_ms`.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, PoolError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
        .connect(&config.url)
        .await
        .map_err(|e| PoolError::Connect(e.to_string()))
}

/// Run `f` inside a single transaction, committing on success and rolling
/// back if `f` returns an error.
///
/// # Errors
///
/// Returns [`PoolError::Transaction`] wrapping whatever error `f` or the
/// commit itself produced.
pub async fn with_transaction<F, Fut, T, E>(pool: &PgPool, f: F) -> Result<T, PoolError>
where
    F: for<'t> FnOnce(&'t mut Transaction<'_, Postgres>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| PoolError::Transaction(e.to_string()))?;

    let result = f(&mut tx).await;

    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| PoolError::Transaction(e.to_string()))?;
            Ok(value)
        },
        Err(err) => {
            let _ = tx.rollback().await;
            Err(PoolError::Transaction(err.to_string()))
        },
    }
}
