//! Validate → authorize → load → decide → append for every user command.

use super::aggregate::{User, UserState};
use super::commands::{CreateUserCommand, DeactivateUserCommand, UpdateUserCommand};
use super::events::UserEvent;
use super::repository::UserRepository;
use iamcore_core::command::{Command, CommandContext, CommandError, CommandHandler, CommandOutcome};
use iamcore_core::event::SerializedEvent;
use iamcore_core::identity::AggregateVersion;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Handles every command the user aggregate accepts.
///
/// Holds a [`UserRepository`] purely to enforce cross-aggregate email
/// uniqueness; it never reads the user's own projection row to decide
/// anything about that aggregate's own state, which always comes from its
/// event history.
pub struct UserCommandHandler {
    repository: Arc<dyn UserRepository>,
}

impl UserCommandHandler {
    /// Construct a handler backed by `repository` for uniqueness checks.
    #[must_use]
    pub const fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }

    async fn load(
        &self,
        ctx: &CommandContext,
        id: &iamcore_core::identity::AggregateId,
    ) -> Result<Option<User>, CommandError> {
        let history = ctx
            .event_store
            .read_aggregate(
                ctx.authz.instance_id().clone(),
                CreateUserCommand::aggregate_type().to_string(),
                id.clone(),
                None,
            )
            .await?;
        User::fold(&history).map_err(|e| CommandError::Internal(e.to_string()))
    }

    async fn append(
        &self,
        ctx: &CommandContext,
        id: &iamcore_core::identity::AggregateId,
        expected_version: AggregateVersion,
        event: &UserEvent,
    ) -> Result<CommandOutcome, CommandError> {
        let serialized = SerializedEvent::from_event(event, None)
            .map_err(|e| CommandError::Internal(e.to_string()))?;
        let new_version = ctx
            .event_store
            .push(
                ctx.authz.instance_id().clone(),
                CreateUserCommand::aggregate_type().to_string(),
                id.clone(),
                expected_version,
                vec![serialized],
            )
            .await?;
        Ok(CommandOutcome {
            aggregate_type: CreateUserCommand::aggregate_type().to_string(),
            aggregate_id: id.clone(),
            new_version,
            events_appended: 1,
        })
    }
}

impl CommandHandler<CreateUserCommand> for UserCommandHandler {
    fn handle(
        &self,
        ctx: &CommandContext,
        command: CreateUserCommand,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send + '_>> {
        Box::pin(async move {
            ctx.authz.require_permission("user.write", "*")?;

            if self.load(ctx, &command.id).await?.is_some() {
                return Err(CommandError::AlreadyExists(format!(
                    "user {} already exists",
                    command.id
                )));
            }

            if self
                .repository
                .email_taken(ctx.authz.instance_id(), &command.email, None)
                .await
                .map_err(|e| CommandError::Internal(e.to_string()))?
            {
                return Err(CommandError::Validation(vec![
                    iamcore_core::command::FieldError::new(
                        "email",
                        "taken",
                        "email is already in use within this instance",
                    ),
                ]));
            }

            let event = UserEvent::Created {
                username: command.username.clone(),
                email: command.email.clone(),
                first_name: command.first_name.clone(),
                last_name: command.last_name.clone(),
            };
            self.append(ctx, &command.id, AggregateVersion::NONE, &event)
                .await
        })
    }
}

impl CommandHandler<UpdateUserCommand> for UserCommandHandler {
    fn handle(
        &self,
        ctx: &CommandContext,
        command: UpdateUserCommand,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send + '_>> {
        Box::pin(async move {
            ctx.authz.require_permission("user.write", command.id.as_str())?;

            let Some(user) = self.load(ctx, &command.id).await? else {
                return Err(CommandError::NotFound(format!("user {} not found", command.id)));
            };
            if user.state != UserState::Active {
                return Err(CommandError::NotActive(format!(
                    "user {} is not active",
                    command.id
                )));
            }

            let email_changes = command
                .email
                .as_ref()
                .is_some_and(|email| *email != user.email);
            let first_name_changes = command
                .first_name
                .as_ref()
                .is_some_and(|name| *name != user.first_name);
            let last_name_changes = command
                .last_name
                .as_ref()
                .is_some_and(|name| *name != user.last_name);

            if !email_changes && !first_name_changes && !last_name_changes {
                return Err(CommandError::NoChanges);
            }

            if email_changes {
                let email = command.email.as_ref().map_or("", String::as_str);
                if self
                    .repository
                    .email_taken(ctx.authz.instance_id(), email, Some(&command.id))
                    .await
                    .map_err(|e| CommandError::Internal(e.to_string()))?
                {
                    return Err(CommandError::Validation(vec![
                        iamcore_core::command::FieldError::new(
                            "email",
                            "taken",
                            "email is already in use within this instance",
                        ),
                    ]));
                }
            }

            let event = UserEvent::Updated {
                email: email_changes.then(|| command.email.clone()).flatten(),
                first_name: first_name_changes.then(|| command.first_name.clone()).flatten(),
                last_name: last_name_changes.then(|| command.last_name.clone()).flatten(),
            };
            self.append(ctx, &command.id, user.version, &event).await
        })
    }
}

impl CommandHandler<DeactivateUserCommand> for UserCommandHandler {
    fn handle(
        &self,
        ctx: &CommandContext,
        command: DeactivateUserCommand,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send + '_>> {
        Box::pin(async move {
            ctx.authz.require_permission("user.write", command.id.as_str())?;

            let Some(user) = self.load(ctx, &command.id).await? else {
                return Err(CommandError::NotFound(format!("user {} not found", command.id)));
            };
            if user.state == UserState::Inactive {
                return Err(CommandError::NoChanges);
            }

            self.append(ctx, &command.id, user.version, &UserEvent::Deactivated)
                .await
        })
    }
}
