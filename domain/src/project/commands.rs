//! Commands accepted by the project aggregate.

use iamcore_core::command::Command;
use iamcore_core::identity::AggregateId;

/// Create a new project under an organization. Fails with `AlreadyExists` if
/// `id` already has history, `NotFound` if `organization_id` does not
/// resolve to an active organization, or a validation error if `slug` is
/// already taken within that organization.
#[derive(Debug, Clone)]
pub struct CreateProjectCommand {
    /// The id to create the project under.
    pub id: AggregateId,
    /// The owning organization's aggregate id.
    pub organization_id: AggregateId,
    /// Unique, URL-safe slug within the organization.
    pub slug: String,
    /// Display name.
    pub name: String,
}

impl Command for CreateProjectCommand {
    fn aggregate_type() -> &'static str {
        "project"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id.clone()
    }
}

/// Change a project's display name.
#[derive(Debug, Clone)]
pub struct UpdateProjectCommand {
    /// The project to update.
    pub id: AggregateId,
    /// The new display name.
    pub name: String,
}

impl Command for UpdateProjectCommand {
    fn aggregate_type() -> &'static str {
        "project"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id.clone()
    }
}

/// Deactivate a project.
#[derive(Debug, Clone)]
pub struct DeactivateProjectCommand {
    /// The project to deactivate.
    pub id: AggregateId,
}

impl Command for DeactivateProjectCommand {
    fn aggregate_type() -> &'static str {
        "project"
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id.clone()
    }
}
