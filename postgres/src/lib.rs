//! `PostgreSQL` backend for the IAM eventstore.
//!
//! Provides [`PostgresEventStore`] (the production `EventStore`
//! implementation), a pooled-connection helper with a transaction-scope
//! convenience function, and [`SchemaLoader`] for applying the
//! versioned, checksum-tracked migrations this workspace's tables need.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod event_store;
mod pool;
mod schema;

pub use event_store::PostgresEventStore;
pub use pool::{PoolError, connect, with_transaction};
pub use schema::{CORE_MIGRATIONS, MigrationUnit, SchemaError, SchemaLoader};
