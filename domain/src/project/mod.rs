//! The project aggregate: commands, events, fold, handlers, projection, and
//! read-model repository.

pub mod aggregate;
pub mod commands;
pub mod events;
pub mod handlers;
pub mod projection;
pub mod repository;

pub use aggregate::{Project, ProjectState};
pub use commands::{CreateProjectCommand, DeactivateProjectCommand, UpdateProjectCommand};
pub use events::ProjectEvent;
pub use handlers::ProjectCommandHandler;
pub use projection::ProjectProjection;
pub use repository::{
    PostgresProjectRepository, ProjectRecord, ProjectRepository, ProjectRepositoryError,
    ProjectSearchFilter,
};
