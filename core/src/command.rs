//! The command bus: the validate → authorize → handle → append pipeline
//! every write in this system goes through.
//!
//! Commands are registered against their handler by concrete Rust type
//! (`TypeId`), not by a runtime string key: [`CommandBus::register`] and
//! [`CommandBus::dispatch`] are both generic over the command type, so a
//! typo in a command name is a compile error, not a runtime "no handler
//! registered" surprise.

use crate::authz::AuthorizationContext;
use crate::event_store::{EventStore, EventStoreError};
use crate::identity::{AggregateId, AggregateVersion};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{ErrorCode, HasErrorCode};

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldError {
    /// The field that failed validation, e.g. `"email"`.
    pub field: String,
    /// A short machine-readable reason, e.g. `"required"`, `"too_long"`.
    pub code: String,
    /// A human-readable message.
    pub message: String,
}

impl FieldError {
    /// Construct a field error.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Errors a command handler or validator can return.
#[derive(Debug, Error)]
pub enum CommandError {
    /// One or more fields failed validation.
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),

    /// The aggregate this command would create already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The referenced aggregate does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The aggregate exists but is not in a state that accepts this command.
    #[error("not active: {0}")]
    NotActive(String),

    /// The command would not change any observable state and was skipped.
    #[error("no changes")]
    NoChanges,

    /// An optimistic concurrency conflict occurred while appending events.
    #[error("concurrency conflict: {0}")]
    Concurrency(#[from] EventStoreError),

    /// The caller's authorization context rejected this command.
    #[error("authorization failed: {0}")]
    Authz(#[from] crate::authz::AuthzError),

    /// An unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HasErrorCode for CommandError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::NotActive(_) => ErrorCode::NotActive,
            Self::NoChanges => ErrorCode::NoChanges,
            Self::Concurrency(e) if e.is_retryable() => ErrorCode::Internal,
            Self::Concurrency(_) => ErrorCode::ConcurrencyConflict,
            Self::Authz(authz_err) => authz_err.code(),
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// A request to change the state of exactly one aggregate.
///
/// `Command` is deliberately minimal: it only names the aggregate type and
/// instance a command targets, so the bus can route it and a handler can
/// load the right aggregate history. The payload fields live on the
/// concrete command struct itself.
pub trait Command: Send + Sync + Sized + 'static {
    /// The aggregate type this command acts on, e.g. `"user"`.
    fn aggregate_type() -> &'static str;

    /// The id of the aggregate instance this command targets.
    fn aggregate_id(&self) -> AggregateId;
}

/// The result of successfully handling a command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// The aggregate type that was modified.
    pub aggregate_type: String,
    /// The aggregate instance that was modified.
    pub aggregate_id: AggregateId,
    /// The aggregate's version immediately after this command's events were
    /// appended.
    pub new_version: AggregateVersion,
    /// How many events this command appended.
    pub events_appended: usize,
}

/// Per-dispatch context: who is asking, and a handle to the eventstore to
/// append to.
#[derive(Clone)]
pub struct CommandContext {
    /// The resolved identity and grants behind this request.
    pub authz: AuthorizationContext,
    /// Shared handle to the eventstore.
    pub event_store: Arc<dyn EventStore>,
}

impl CommandContext {
    /// Construct a dispatch context.
    #[must_use]
    pub const fn new(authz: AuthorizationContext, event_store: Arc<dyn EventStore>) -> Self {
        Self { authz, event_store }
    }
}

/// Validates and executes one command type, appending the resulting events
/// to the eventstore.
///
/// Implementations are responsible for the full validate → authorize →
/// load-aggregate → decide → append pipeline for their command; the bus
/// only handles routing and post-dispatch middleware.
pub trait CommandHandler<C: Command>: Send + Sync {
    /// Handle `command`.
    ///
    /// # Errors
    ///
    /// Returns any [`CommandError`] variant appropriate to why the command
    /// could not be applied.
    fn handle(
        &self,
        ctx: &CommandContext,
        command: C,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send + '_>>;
}

/// Runs after a command has been successfully dispatched.
///
/// Used for cross-cutting concerns (audit logging, metrics) that apply to
/// every command uniformly rather than being duplicated in every handler.
pub trait CommandMiddleware: Send + Sync {
    /// Called once per successful dispatch, after events have been appended.
    fn after_dispatch<'a>(
        &'a self,
        ctx: &'a CommandContext,
        outcome: &'a CommandOutcome,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

type ErasedHandler = Box<
    dyn Fn(
            CommandContext,
            Box<dyn Any + Send>,
        ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send>>
        + Send
        + Sync,
>;

/// A typed registry mapping command types to their handler, plus a
/// middleware chain run after every successful dispatch.
///
/// Built once at startup via [`CommandBus::register`] and then shared
/// read-only (`Arc<CommandBus>`) across request-handling tasks.
#[derive(Default)]
pub struct CommandBus {
    handlers: HashMap<TypeId, ErasedHandler>,
    middleware: Vec<Arc<dyn CommandMiddleware>>,
}

impl CommandBus {
    /// Construct an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            middleware: Vec::new(),
        }
    }

    /// Register `handler` as the handler for command type `C`.
    ///
    /// Registering a second handler for the same `C` replaces the first.
    pub fn register<C, H>(&mut self, handler: H)
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let handler = Arc::new(handler);
        self.handlers.insert(
            TypeId::of::<C>(),
            Box::new(move |ctx, boxed_command| {
                let handler = Arc::clone(&handler);
                #[allow(clippy::expect_used)]
                let command = *boxed_command
                    .downcast::<C>()
                    .expect("command type id matched its registration");
                Box::pin(async move { handler.handle(&ctx, command).await })
            }),
        );
    }

    /// Add a middleware to run after every successful dispatch, in
    /// registration order.
    pub fn use_middleware(&mut self, middleware: impl CommandMiddleware + 'static) {
        self.middleware.push(Arc::new(middleware));
    }

    /// Dispatch `command` to its registered handler, then run middleware.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Internal`] if no handler is registered for
    /// `C`, or whatever error the handler itself returns.
    pub async fn dispatch<C: Command>(
        &self,
        ctx: CommandContext,
        command: C,
    ) -> Result<CommandOutcome, CommandError> {
        let handler = self.handlers.get(&TypeId::of::<C>()).ok_or_else(|| {
            CommandError::Internal(format!(
                "no handler registered for command type {}",
                std::any::type_name::<C>()
            ))
        })?;
        let outcome = handler(ctx.clone(), Box::new(command)).await?;
        for mw in &self.middleware {
            mw.after_dispatch(&ctx, &outcome).await;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::InstanceId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CreateThing {
        id: String,
    }

    impl Command for CreateThing {
        fn aggregate_type() -> &'static str {
            "thing"
        }

        fn aggregate_id(&self) -> AggregateId {
            AggregateId::new(self.id.clone())
        }
    }

    struct CreateThingHandler;

    impl CommandHandler<CreateThing> for CreateThingHandler {
        fn handle(
            &self,
            _ctx: &CommandContext,
            command: CreateThing,
        ) -> Pin<Box<dyn Future<Output = Result<CommandOutcome, CommandError>> + Send + '_>> {
            Box::pin(async move {
                Ok(CommandOutcome {
                    aggregate_type: "thing".to_string(),
                    aggregate_id: AggregateId::new(command.id),
                    new_version: AggregateVersion::new(1),
                    events_appended: 1,
                })
            })
        }
    }

    struct CountingMiddleware(Arc<AtomicUsize>);

    impl CommandMiddleware for CountingMiddleware {
        fn after_dispatch<'a>(
            &'a self,
            _ctx: &'a CommandContext,
            _outcome: &'a CommandOutcome,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async {})
        }
    }

    struct NullEventStore;

    impl EventStore for NullEventStore {
        fn push(
            &self,
            _instance_id: InstanceId,
            _aggregate_type: String,
            _aggregate_id: AggregateId,
            _expected_version: AggregateVersion,
            _events: Vec<crate::event::SerializedEvent>,
        ) -> Pin<Box<dyn Future<Output = Result<AggregateVersion, EventStoreError>> + Send + '_>>
        {
            Box::pin(async { Ok(AggregateVersion::new(1)) })
        }

        fn read_aggregate(
            &self,
            _instance_id: InstanceId,
            _aggregate_type: String,
            _aggregate_id: AggregateId,
            _from_version: Option<AggregateVersion>,
        ) -> Pin<
            Box<
                dyn Future<Output = Result<Vec<crate::event_store::StoredEvent>, EventStoreError>>
                    + Send
                    + '_,
            >,
        > {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn read_since(
            &self,
            _instance_id: InstanceId,
            _after: crate::identity::GlobalPosition,
            _limit: u32,
            _filter: crate::event_store::ReadSinceFilter,
        ) -> Pin<
            Box<
                dyn Future<Output = Result<Vec<crate::event_store::StoredEvent>, EventStoreError>>
                    + Send
                    + '_,
            >,
        > {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn current_position(
            &self,
            _instance_id: InstanceId,
        ) -> Pin<Box<dyn Future<Output = Result<crate::identity::GlobalPosition, EventStoreError>> + Send + '_>>
        {
            Box::pin(async { Ok(crate::identity::GlobalPosition::BEGINNING) })
        }
    }

    fn test_ctx() -> CommandContext {
        CommandContext::new(
            AuthorizationContext::builder(InstanceId::new("acme"), "tester")
                .token_type(crate::authz::TokenType::System)
                .build(),
            Arc::new(NullEventStore),
        )
    }

    #[tokio::test]
    async fn dispatch_routes_to_registered_handler() {
        let mut bus = CommandBus::new();
        bus.register::<CreateThing, _>(CreateThingHandler);

        let outcome = bus
            .dispatch(test_ctx(), CreateThing { id: "t-1".to_string() })
            .await
            .expect("handler is registered");

        assert_eq!(outcome.aggregate_id, AggregateId::new("t-1"));
        assert_eq!(outcome.events_appended, 1);
    }

    #[tokio::test]
    async fn dispatch_without_handler_is_internal_error() {
        let bus = CommandBus::new();
        let err = bus
            .dispatch(test_ctx(), CreateThing { id: "t-1".to_string() })
            .await
            .expect_err("no handler registered");
        assert!(matches!(err, CommandError::Internal(_)));
    }

    #[tokio::test]
    async fn middleware_runs_after_successful_dispatch() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = CommandBus::new();
        bus.register::<CreateThing, _>(CreateThingHandler);
        bus.use_middleware(CountingMiddleware(Arc::clone(&counter)));

        bus.dispatch(test_ctx(), CreateThing { id: "t-1".to_string() })
            .await
            .expect("dispatch succeeds");

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
