//! Projection runtime for the IAM backend.
//!
//! This crate provides the concrete pieces [`iamcore_core::projection`]
//! only defines as traits:
//!
//! - [`ProjectionManager`]: polls [`iamcore_core::event_store::EventStore`]
//!   via `read_since` and drives one [`iamcore_core::projection::Projection`]
//!   to catch up, own its lock, and expose its progress.
//! - [`PostgresProjectionCheckpoint`] / [`PostgresProjectionLock`]: durable,
//!   `Postgres`-backed implementations of the checkpoint and lock traits
//!   against the `projection_states`/`projection_locks` tables
//!   [`iamcore_postgres::CORE_MIGRATIONS`] provisions.
//!
//! # Architecture
//!
//! ```text
//! EventStore::read_since  ->  ProjectionManager  ->  Projection::apply
//!                                   |
//!                          ProjectionCheckpoint / ProjectionLock
//! ```
//!
//! Unlike a message-bus subscriber, there is no independent "consumer
//! offset" to reconcile against a projection checkpoint: `read_since`'s
//! `(position, in_position_order)` cursor *is* the checkpoint, so resuming
//! after a restart is just resuming the poll loop from the last saved
//! position.

pub mod manager;
pub mod postgres;

pub use manager::ProjectionManager;
pub use postgres::{PostgresProjectionCheckpoint, PostgresProjectionLock};
