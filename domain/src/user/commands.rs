//! Commands accepted by the user aggregate.

use iamcore_core::command::Command;
use iamcore_core::identity::AggregateId;

/// Create a new user. Fails with `AlreadyExists` if `id` already has
/// history.
#[derive(Debug, Clone)]
pub struct CreateUserCommand {
    /// The id to create the user under.
    pub id: AggregateId,
    /// Login name, must be unique within the instance.
    pub username: String,
    /// Email address, must be unique within the instance.
    pub email: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
}

impl Command for CreateUserCommand {
    fn aggregate_type() -> &'static str {
        "user"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id.clone()
    }
}

/// Change one or more of a user's profile fields. At least one field must
/// be `Some` and differ from the current value, or the handler fails with
/// `NoChanges`.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserCommand {
    /// The user to update.
    pub id: AggregateId,
    /// New email, if changing.
    pub email: Option<String>,
    /// New given name, if changing.
    pub first_name: Option<String>,
    /// New family name, if changing.
    pub last_name: Option<String>,
}

impl Command for UpdateUserCommand {
    fn aggregate_type() -> &'static str {
        "user"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id.clone()
    }
}

/// Deactivate a user, rejecting further mutating commands until
/// reactivated.
#[derive(Debug, Clone)]
pub struct DeactivateUserCommand {
    /// The user to deactivate.
    pub id: AggregateId,
}

impl Command for DeactivateUserCommand {
    fn aggregate_type() -> &'static str {
        "user"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id.clone()
    }
}
