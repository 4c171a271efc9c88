//! Versioned, checksum-tracked schema migrations for the eventstore and
//! projection databases.
//!
//! Each [`MigrationUnit`] is applied inside its own transaction and recorded
//! in `schema_migrations` along with a SHA-256 checksum of its SQL. Running
//! the loader again is a no-op for already-applied versions; if an
//! already-applied migration's SQL changed since it ran, the loader refuses
//! to continue rather than silently drift from what actually ran against
//! the database.

use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use thiserror::Error;

/// One migration: an ordered version, a human-readable name, and the SQL to
/// run exactly once.
#[derive(Debug, Clone, Copy)]
pub struct MigrationUnit {
    /// Monotonically increasing version, e.g. `1`, `2`, `3`.
    pub version: i64,
    /// A short descriptive name, e.g. `"create_events_table"`.
    pub name: &'static str,
    /// The SQL statements to execute.
    pub sql: &'static str,
}

/// Errors raised while loading or applying migrations.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A database error occurred while applying a migration.
    #[error("database error: {0}")]
    DatabaseError(String),

    /// An already-applied migration's SQL no longer matches the checksum
    /// recorded when it ran.
    #[error("migration {version} ({name}) checksum mismatch: the migration's SQL changed after it was applied")]
    ChecksumMismatch {
        /// The migration version whose checksum no longer matches.
        version: i64,
        /// The migration's name.
        name: String,
    },
}

fn checksum(sql: &str) -> String {
    let digest = Sha256::digest(sql.as_bytes());
    format!("{digest:x}")
}

/// Applies an ordered list of [`MigrationUnit`]s against a pool, tracking
/// which versions have already run in a `schema_migrations` table.
pub struct SchemaLoader {
    pool: PgPool,
}

impl SchemaLoader {
    /// Construct a loader over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_migration_table(&self) -> Result<(), SchemaError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                checksum TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                execution_time_ms INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SchemaError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    /// Apply every migration in `units` (assumed already sorted by
    /// `version`) that has not yet run, in order, each in its own
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::ChecksumMismatch`] if an already-applied
    /// migration's SQL no longer matches what was recorded, or
    /// [`SchemaError::DatabaseError`] if applying a pending migration fails.
    pub async fn run(&self, units: &[MigrationUnit]) -> Result<Vec<i64>, SchemaError> {
        self.ensure_migration_table().await?;

        let mut applied = Vec::new();
        for unit in units {
            let existing: Option<String> =
                sqlx::query_scalar("SELECT checksum FROM schema_migrations WHERE version = $1")
                    .bind(unit.version)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| SchemaError::DatabaseError(e.to_string()))?;

            let sum = checksum(unit.sql);

            match existing {
                Some(recorded) if recorded == sum => {
                    tracing::debug!(version = unit.version, name = unit.name, "already applied");
                    continue;
                },
                Some(_) => {
                    return Err(SchemaError::ChecksumMismatch {
                        version: unit.version,
                        name: unit.name.to_string(),
                    });
                },
                None => {},
            }

            let started = std::time::Instant::now();
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| SchemaError::DatabaseError(e.to_string()))?;

            sqlx::raw_sql(unit.sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| SchemaError::DatabaseError(e.to_string()))?;

            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let elapsed_ms = started.elapsed().as_millis() as i32;

            sqlx::query(
                "INSERT INTO schema_migrations (version, name, checksum, execution_time_ms) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(unit.version)
            .bind(unit.name)
            .bind(&sum)
            .bind(elapsed_ms)
            .execute(&mut *tx)
            .await
            .map_err(|e| SchemaError::DatabaseError(e.to_string()))?;

            tx.commit()
                .await
                .map_err(|e| SchemaError::DatabaseError(e.to_string()))?;

            tracing::info!(version = unit.version, name = unit.name, elapsed_ms, "applied migration");
            applied.push(unit.version);
        }

        Ok(applied)
    }

    /// List versions recorded as applied, for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DatabaseError`] if the query fails.
    pub async fn applied_versions(&self) -> Result<Vec<i64>, SchemaError> {
        self.ensure_migration_table().await?;
        let rows = sqlx::query("SELECT version FROM schema_migrations ORDER BY version ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SchemaError::DatabaseError(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get("version")).collect())
    }
}

/// The migration units that bring a fresh database up to the schema this
/// workspace expects: the eventstore log, the projection checkpoint and
/// lock tables, and the sequence backing global positions.
pub const CORE_MIGRATIONS: &[MigrationUnit] = &[
    MigrationUnit {
        version: 1,
        name: "create_events_position_seq",
        sql: "CREATE SEQUENCE IF NOT EXISTS events_position_seq",
    },
    MigrationUnit {
        version: 2,
        name: "create_events_table",
        sql: "CREATE TABLE IF NOT EXISTS events (
            instance_id TEXT NOT NULL,
            aggregate_type TEXT NOT NULL,
            aggregate_id TEXT NOT NULL,
            aggregate_version BIGINT NOT NULL,
            global_position BIGINT NOT NULL,
            in_position_order INT NOT NULL,
            event_type TEXT NOT NULL,
            payload JSONB NOT NULL,
            metadata JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (instance_id, aggregate_type, aggregate_id, aggregate_version)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_events_global_position
            ON events (instance_id, global_position, in_position_order);
        CREATE INDEX IF NOT EXISTS idx_events_event_type ON events (event_type);",
    },
    MigrationUnit {
        version: 3,
        name: "create_projection_states_table",
        sql: "CREATE TABLE IF NOT EXISTS projection_states (
            instance_id TEXT NOT NULL,
            projection_name TEXT NOT NULL,
            global_position BIGINT NOT NULL DEFAULT 0,
            in_position_order INT NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            error_count INT NOT NULL DEFAULT 0,
            last_error TEXT,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (instance_id, projection_name)
        )",
    },
    MigrationUnit {
        version: 4,
        name: "create_projection_locks_table",
        sql: "CREATE TABLE IF NOT EXISTS projection_locks (
            projection_name TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL
        )",
    },
];
