//! Validate → authorize → load → decide → append for every organization
//! command.

use super::aggregate::{Organization, OrganizationState};
use super::commands::{
    CreateOrganizationCommand, DeactivateOrganizationCommand, UpdateOrganizationCommand,
};
use super::events::OrganizationEvent;
use super::repository::OrganizationRepository;
use iamcore_core::command::{Command, CommandContext, CommandError, CommandHandler, CommandOutcome};
use iamcore_core::event::SerializedEvent;
use iamcore_core::identity::AggregateVersion;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Handles every command the organization aggregate accepts.
pub struct OrganizationCommandHandler {
    repository: Arc<dyn OrganizationRepository>,
}

impl OrganizationCommandHandler {
    /// Construct a handler backed by `repository` for uniqueness checks.
    #[must_use]
    pub const fn new(repository: Arc<dyn OrganizationRepository>) -> Self {
        Self { repository }
    }

    async fn load(
        &self,
        ctx: &CommandContext,
        id: &iamcore_core::identity::AggregateId,
    ) -> Result<Option<Organization>, CommandError> {
        let history = ctx
            .event_store
            .read_aggregate(
                ctx.authz.instance_id().clone(),
                CreateOrganizationCommand::aggregate_type().to_string(),
                id.clone(),
                None,
            )
            .await?;
        Organization::fold(&history).map_err(|e| CommandError::Internal(e.to_string()))
    }

    async fn append(
        &self,
        ctx: &CommandContext,
        id: &iamcore_core::identity::AggregateId,
        expected_version: AggregateVersion,
        event: &OrganizationEvent,
    ) -> Result<CommandOutcome, CommandError> {
        let serialized = SerializedEvent::from_event(event, None)
            .map_err(|e| CommandError::Internal(e.to_string()))?;
        let new_version = ctx
            .event_store
            .push(
                ctx.authz.instance_id().clone(),
                CreateOrganizationCommand::aggregate_type().to_string(),
                id.clone(),
                expected_version,
                vec![serialized],
            )
            .await?;
        Ok(CommandOutcome {
            aggregate_type: CreateOrganizationCommand::aggregate_type().to_string(),
            aggregate_id: id.clone(),
            new_version,
            events_appended: 1,
        })
    }
}

impl CommandHandler<CreateOrganizationCommand> for OrganizationCommandHandler {
    fn handle(
        &self,
        ctx: &CommandContext,
        command: CreateOrganizationCommand,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send + '_>> {
        Box::pin(async move {
            ctx.authz.require_permission("organization.write", "*")?;

            if self.load(ctx, &command.id).await?.is_some() {
                return Err(CommandError::AlreadyExists(format!(
                    "organization {} already exists",
                    command.id
                )));
            }

            if self
                .repository
                .slug_taken(ctx.authz.instance_id(), &command.slug, None)
                .await
                .map_err(|e| CommandError::Internal(e.to_string()))?
            {
                return Err(CommandError::Validation(vec![
                    iamcore_core::command::FieldError::new(
                        "slug",
                        "taken",
                        "slug is already in use within this instance",
                    ),
                ]));
            }

            let event = OrganizationEvent::Created {
                slug: command.slug.clone(),
                name: command.name.clone(),
            };
            self.append(ctx, &command.id, AggregateVersion::NONE, &event)
                .await
        })
    }
}

impl CommandHandler<UpdateOrganizationCommand> for OrganizationCommandHandler {
    fn handle(
        &self,
        ctx: &CommandContext,
        command: UpdateOrganizationCommand,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send + '_>> {
        Box::pin(async move {
            ctx.authz
                .require_permission("organization.write", command.id.as_str())?;

            let Some(org) = self.load(ctx, &command.id).await? else {
                return Err(CommandError::NotFound(format!(
                    "organization {} not found",
                    command.id
                )));
            };
            if org.state != OrganizationState::Active {
                return Err(CommandError::NotActive(format!(
                    "organization {} is not active",
                    command.id
                )));
            }
            if org.name == command.name {
                return Err(CommandError::NoChanges);
            }

            let event = OrganizationEvent::Updated {
                name: command.name.clone(),
            };
            self.append(ctx, &command.id, org.version, &event).await
        })
    }
}

impl CommandHandler<DeactivateOrganizationCommand> for OrganizationCommandHandler {
    fn handle(
        &self,
        ctx: &CommandContext,
        command: DeactivateOrganizationCommand,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send + '_>> {
        Box::pin(async move {
            ctx.authz
                .require_permission("organization.write", command.id.as_str())?;

            let Some(org) = self.load(ctx, &command.id).await? else {
                return Err(CommandError::NotFound(format!(
                    "organization {} not found",
                    command.id
                )));
            };
            if org.state == OrganizationState::Inactive {
                return Err(CommandError::NoChanges);
            }

            self.append(ctx, &command.id, org.version, &OrganizationEvent::Deactivated)
                .await
        })
    }
}
