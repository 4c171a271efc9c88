//! The organization aggregate: commands, events, fold, handlers, projection,
//! and read-model repository.

pub mod aggregate;
pub mod commands;
pub mod events;
pub mod handlers;
pub mod projection;
pub mod repository;

pub use aggregate::{Organization, OrganizationState};
pub use commands::{CreateOrganizationCommand, DeactivateOrganizationCommand, UpdateOrganizationCommand};
pub use events::OrganizationEvent;
pub use handlers::OrganizationCommandHandler;
pub use projection::OrganizationProjection;
pub use repository::{
    OrganizationRecord, OrganizationRepository, OrganizationRepositoryError,
    OrganizationSearchFilter, PostgresOrganizationRepository,
};
