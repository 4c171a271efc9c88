//! Migration units for the domain crate's read-model tables.
//!
//! Numbered starting at 100 so they always apply after
//! [`iamcore_postgres::CORE_MIGRATIONS`] regardless of which order the two
//! lists are concatenated in.

use iamcore_postgres::MigrationUnit;

/// The migration units that create `users_projection`,
/// `organizations_projection`, and `projects_projection`.
pub const DOMAIN_MIGRATIONS: &[MigrationUnit] = &[
    MigrationUnit {
        version: 100,
        name: "create_users_projection_table",
        sql: "CREATE TABLE IF NOT EXISTS users_projection (
            id TEXT NOT NULL,
            instance_id TEXT NOT NULL,
            username TEXT NOT NULL,
            email TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            state TEXT NOT NULL,
            version BIGINT NOT NULL,
            PRIMARY KEY (instance_id, id)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_users_projection_username
            ON users_projection (instance_id, username);
        CREATE INDEX IF NOT EXISTS idx_users_projection_email
            ON users_projection (instance_id, email);",
    },
    MigrationUnit {
        version: 101,
        name: "create_organizations_projection_table",
        sql: "CREATE TABLE IF NOT EXISTS organizations_projection (
            id TEXT NOT NULL,
            instance_id TEXT NOT NULL,
            slug TEXT NOT NULL,
            name TEXT NOT NULL,
            state TEXT NOT NULL,
            version BIGINT NOT NULL,
            PRIMARY KEY (instance_id, id)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_organizations_projection_slug
            ON organizations_projection (instance_id, slug);",
    },
    MigrationUnit {
        version: 102,
        name: "create_projects_projection_table",
        sql: "CREATE TABLE IF NOT EXISTS projects_projection (
            id TEXT NOT NULL,
            instance_id TEXT NOT NULL,
            organization_id TEXT NOT NULL,
            slug TEXT NOT NULL,
            name TEXT NOT NULL,
            state TEXT NOT NULL,
            version BIGINT NOT NULL,
            PRIMARY KEY (instance_id, id)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_projection_slug
            ON projects_projection (instance_id, organization_id, slug);
        CREATE INDEX IF NOT EXISTS idx_projects_projection_org
            ON projects_projection (instance_id, organization_id);",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_migrations_version_after_core_migrations() {
        let min_version = DOMAIN_MIGRATIONS.iter().map(|m| m.version).min().unwrap_or(i64::MAX);
        let max_core = iamcore_postgres::CORE_MIGRATIONS
            .iter()
            .map(|m| m.version)
            .max()
            .unwrap_or(0);
        assert!(min_version > max_core);
    }
}
