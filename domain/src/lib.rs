//! # `IAM` Domain
//!
//! The user, organization, and project aggregates this workspace ships as
//! worked examples of the command-bus and projection contracts defined in
//! [`iamcore_core`]: commands, events, aggregate folds, command handlers,
//! projections, and read-model repositories for each.
//!
//! ## Layering
//!
//! - [`user`]: the user aggregate end to end.
//! - [`organization`]: the organization aggregate end to end.
//! - [`project`]: the project aggregate, which additionally reads
//!   [`organization`]'s read model to confirm its owning organization
//!   exists and is active.
//! - [`query`]: the shared `Page`/`SortOrder` shapes every repository's
//!   `search` returns.
//! - [`migrations`]: the `users_projection`/`organizations_projection`/
//!   `projects_projection` table migrations, numbered to apply after
//!   [`iamcore_postgres::CORE_MIGRATIONS`].

/// The user aggregate: commands, events, fold, handlers, projection, and
/// read-model repository.
pub mod user;

/// The organization aggregate: commands, events, fold, handlers,
/// projection, and read-model repository.
pub mod organization;

/// The project aggregate: commands, events, fold, handlers, projection, and
/// read-model repository.
pub mod project;

/// Shared pagination shape for read-model repository queries.
pub mod query;

/// Migration units for this crate's read-model tables.
pub mod migrations;

pub use migrations::DOMAIN_MIGRATIONS;
