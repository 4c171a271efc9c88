//! # `IAM` Core Testing
//!
//! In-memory test doubles for the eventstore and projection traits, plus a
//! deterministic clock, so domain and projection crates can test business
//! logic without a database.
//!
//! ## Example
//!
//! ```ignore
//! use iamcore_testing::InMemoryEventStore;
//! use std::sync::Arc;
//!
//! let store: Arc<dyn iamcore_core::event_store::EventStore> =
//!     Arc::new(InMemoryEventStore::new());
//! ```

pub mod clock;
pub mod event_store;
pub mod projection;

#[cfg(test)]
mod properties;

pub use clock::{FixedClock, test_clock};
pub use event_store::InMemoryEventStore;
pub use projection::{InMemoryProjectionCheckpoint, InMemoryProjectionLock};
