//! Commands accepted by the organization aggregate.

use iamcore_core::command::Command;
use iamcore_core::identity::AggregateId;

/// Create a new organization. Fails with `AlreadyExists` if `id` already has
/// history, or a validation error if `slug` is already taken within the
/// instance.
#[derive(Debug, Clone)]
pub struct CreateOrganizationCommand {
    /// The id to create the organization under.
    pub id: AggregateId,
    /// Unique, URL-safe slug.
    pub slug: String,
    /// Display name.
    pub name: String,
}

impl Command for CreateOrganizationCommand {
    fn aggregate_type() -> &'static str {
        "organization"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id.clone()
    }
}

/// Change an organization's display name. Fails with `NoChanges` if `name`
/// matches the current value.
#[derive(Debug, Clone)]
pub struct UpdateOrganizationCommand {
    /// The organization to update.
    pub id: AggregateId,
    /// The new display name.
    pub name: String,
}

impl Command for UpdateOrganizationCommand {
    fn aggregate_type() -> &'static str {
        "organization"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id.clone()
    }
}

/// Deactivate an organization.
#[derive(Debug, Clone)]
pub struct DeactivateOrganizationCommand {
    /// The organization to deactivate.
    pub id: AggregateId,
}

impl Command for DeactivateOrganizationCommand {
    fn aggregate_type() -> &'static str {
        "organization"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id.clone()
    }
}
