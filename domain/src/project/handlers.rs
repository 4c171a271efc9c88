//! Validate → authorize → load → decide → append for every project command.

use super::aggregate::{Project, ProjectState};
use super::commands::{CreateProjectCommand, DeactivateProjectCommand, UpdateProjectCommand};
use super::events::ProjectEvent;
use super::repository::ProjectRepository;
use crate::organization::repository::OrganizationRepository;
use iamcore_core::command::{Command, CommandContext, CommandError, CommandHandler, CommandOutcome};
use iamcore_core::event::SerializedEvent;
use iamcore_core::identity::AggregateVersion;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Handles every command the project aggregate accepts.
///
/// Holds a [`ProjectRepository`] for slug uniqueness within an organization
/// and an [`OrganizationRepository`] to confirm the owning organization
/// exists and is active; neither is ever consulted for the project's own
/// state, which always comes from its event history.
pub struct ProjectCommandHandler {
    projects: Arc<dyn ProjectRepository>,
    organizations: Arc<dyn OrganizationRepository>,
}

impl ProjectCommandHandler {
    /// Construct a handler backed by `projects` and `organizations` for
    /// cross-aggregate checks.
    #[must_use]
    pub const fn new(
        projects: Arc<dyn ProjectRepository>,
        organizations: Arc<dyn OrganizationRepository>,
    ) -> Self {
        Self {
            projects,
            organizations,
        }
    }

    async fn load(
        &self,
        ctx: &CommandContext,
        id: &iamcore_core::identity::AggregateId,
    ) -> Result<Option<Project>, CommandError> {
        let history = ctx
            .event_store
            .read_aggregate(
                ctx.authz.instance_id().clone(),
                CreateProjectCommand::aggregate_type().to_string(),
                id.clone(),
                None,
            )
            .await?;
        Project::fold(&history).map_err(|e| CommandError::Internal(e.to_string()))
    }

    async fn append(
        &self,
        ctx: &CommandContext,
        id: &iamcore_core::identity::AggregateId,
        expected_version: AggregateVersion,
        event: &ProjectEvent,
    ) -> Result<CommandOutcome, CommandError> {
        let serialized = SerializedEvent::from_event(event, None)
            .map_err(|e| CommandError::Internal(e.to_string()))?;
        let new_version = ctx
            .event_store
            .push(
                ctx.authz.instance_id().clone(),
                CreateProjectCommand::aggregate_type().to_string(),
                id.clone(),
                expected_version,
                vec![serialized],
            )
            .await?;
        Ok(CommandOutcome {
            aggregate_type: CreateProjectCommand::aggregate_type().to_string(),
            aggregate_id: id.clone(),
            new_version,
            events_appended: 1,
        })
    }
}

impl CommandHandler<CreateProjectCommand> for ProjectCommandHandler {
    fn handle(
        &self,
        ctx: &CommandContext,
        command: CreateProjectCommand,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send + '_>> {
        Box::pin(async move {
            ctx.authz.require_permission("project.write", "*")?;

            if self.load(ctx, &command.id).await?.is_some() {
                return Err(CommandError::AlreadyExists(format!(
                    "project {} already exists",
                    command.id
                )));
            }

            let organization = self
                .organizations
                .get_by_id(ctx.authz.instance_id(), &command.organization_id)
                .await
                .map_err(|e| CommandError::Internal(e.to_string()))?;
            match organization {
                None => {
                    return Err(CommandError::NotFound(format!(
                        "organization {} not found",
                        command.organization_id
                    )));
                },
                Some(org) if org.state != "active" => {
                    return Err(CommandError::NotActive(format!(
                        "organization {} is not active",
                        command.organization_id
                    )));
                },
                Some(_) => {},
            }

            if self
                .projects
                .slug_taken(
                    ctx.authz.instance_id(),
                    &command.organization_id,
                    &command.slug,
                    None,
                )
                .await
                .map_err(|e| CommandError::Internal(e.to_string()))?
            {
                return Err(CommandError::Validation(vec![
                    iamcore_core::command::FieldError::new(
                        "slug",
                        "taken",
                        "slug is already in use within this organization",
                    ),
                ]));
            }

            let event = ProjectEvent::Created {
                organization_id: command.organization_id.as_str().to_string(),
                slug: command.slug.clone(),
                name: command.name.clone(),
            };
            self.append(ctx, &command.id, AggregateVersion::NONE, &event)
                .await
        })
    }
}

impl CommandHandler<UpdateProjectCommand> for ProjectCommandHandler {
    fn handle(
        &self,
        ctx: &CommandContext,
        command: UpdateProjectCommand,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send + '_>> {
        Box::pin(async move {
            ctx.authz.require_permission("project.write", command.id.as_str())?;

            let Some(project) = self.load(ctx, &command.id).await? else {
                return Err(CommandError::NotFound(format!(
                    "project {} not found",
                    command.id
                )));
            };
            if project.state != ProjectState::Active {
                return Err(CommandError::NotActive(format!(
                    "project {} is not active",
                    command.id
                )));
            }
            if project.name == command.name {
                return Err(CommandError::NoChanges);
            }

            let event = ProjectEvent::Updated {
                name: command.name.clone(),
            };
            self.append(ctx, &command.id, project.version, &event).await
        })
    }
}

impl CommandHandler<DeactivateProjectCommand> for ProjectCommandHandler {
    fn handle(
        &self,
        ctx: &CommandContext,
        command: DeactivateProjectCommand,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send + '_>> {
        Box::pin(async move {
            ctx.authz.require_permission("project.write", command.id.as_str())?;

            let Some(project) = self.load(ctx, &command.id).await? else {
                return Err(CommandError::NotFound(format!(
                    "project {} not found",
                    command.id
                )));
            };
            if project.state == ProjectState::Inactive {
                return Err(CommandError::NoChanges);
            }

            self.append(ctx, &command.id, project.version, &ProjectEvent::Deactivated)
                .await
        })
    }
}
