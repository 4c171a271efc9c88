//! # IAM Core
//!
//! Core traits and types for the event-sourced, multi-tenant IAM backend:
//! the eventstore contract, the command bus pipeline, the projection
//! contracts, the authorization context, and the shared error/config types
//! every other crate in this workspace builds on.
//!
//! ## Layering
//!
//! - [`identity`]: tenant/aggregate/version/position newtypes.
//! - [`event`]: the `Event` trait and the wire-level `SerializedEvent`.
//! - [`event_store`]: the `EventStore` trait (push/read/tail).
//! - [`command`]: the command bus (`Command`, `CommandHandler`, `CommandBus`).
//! - [`projection`]: `Projection`, `ProjectionCheckpoint`, `ProjectionLock`.
//! - [`authz`]: `AuthorizationContext` and its gating errors.
//! - [`config`]: configuration structs for every tunable named in the
//!   external interface.
//! - [`error`]: the `ErrorCode` enum every public error maps onto.

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

/// Tenant/aggregate identity and ordering newtypes.
pub mod identity;

/// The `Event` trait and serialized wire format.
pub mod event;

/// The `EventStore` trait and its error/result types.
pub mod event_store;

/// Command bus: commands, handlers, validators, middleware, dispatch.
pub mod command;

/// Projection contracts: `Projection`, checkpoints, and catch-up locks.
pub mod projection;

/// Authorization context: token typing, feature/quota/permission gates.
pub mod authz;

/// Configuration structs for every tunable component.
pub mod config;

/// The shared error-code taxonomy every public error type maps onto.
pub mod error;

/// Abstracts time so business logic and tests don't depend on the system
/// clock directly.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// A source of the current time.
    ///
    /// Production code uses [`SystemClock`]; tests inject a fixed clock so
    /// event timestamps and TTL expiry are deterministic.
    pub trait Clock: Send + Sync {
        /// The current time.
        fn now(&self) -> DateTime<Utc>;
    }

    /// A [`Clock`] backed by the system clock.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
