//! The user aggregate: commands, events, fold, handlers, projection, and
//! read-model repository.

pub mod aggregate;
pub mod commands;
pub mod events;
pub mod handlers;
pub mod projection;
pub mod repository;

pub use aggregate::{User, UserState};
pub use commands::{CreateUserCommand, DeactivateUserCommand, UpdateUserCommand};
pub use events::UserEvent;
pub use handlers::UserCommandHandler;
pub use projection::UserProjection;
pub use repository::{PostgresUserRepository, UserRecord, UserRepository, UserRepositoryError, UserSearchFilter};
