//! End-to-end command-bus scenarios for the user aggregate: create, reject
//! a duplicate create, update then deactivate, and reject a no-op update.

use iamcore_core::authz::{AuthorizationContext, TokenType};
use iamcore_core::command::{CommandBus, CommandContext, CommandError};
use iamcore_core::event_store::EventStore;
use iamcore_core::identity::{AggregateId, InstanceId};
use iamcore_domain::user::repository::{
    UserRecord, UserRepository, UserRepositoryError, UserSearchFilter,
};
use iamcore_domain::user::{CreateUserCommand, DeactivateUserCommand, UpdateUserCommand, UserCommandHandler};
use iamcore_domain::query::{Page, SortOrder};
use iamcore_testing::InMemoryEventStore;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Tracks taken emails without ever reading the user aggregate's own event
/// history, mirroring what a real projection-backed repository would see
/// after the projection catches up.
#[derive(Default)]
struct FakeUserRepository {
    emails: Mutex<HashSet<String>>,
}

impl UserRepository for FakeUserRepository {
    fn get_by_id(
        &self,
        _instance_id: &InstanceId,
        _id: &AggregateId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UserRecord>, UserRepositoryError>> + Send + '_>> {
        Box::pin(async { Ok(None) })
    }

    fn get_by_username(
        &self,
        _instance_id: &InstanceId,
        _username: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UserRecord>, UserRepositoryError>> + Send + '_>> {
        Box::pin(async { Ok(None) })
    }

    fn email_taken(
        &self,
        _instance_id: &InstanceId,
        email: &str,
        _exclude_id: Option<&AggregateId>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, UserRepositoryError>> + Send + '_>> {
        let taken = self
            .emails
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(email);
        Box::pin(async move { Ok(taken) })
    }

    fn search(
        &self,
        _instance_id: &InstanceId,
        _filter: &UserSearchFilter,
        _sort: SortOrder,
        offset: u32,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Page<UserRecord>, UserRepositoryError>> + Send + '_>> {
        Box::pin(async move {
            Ok(Page {
                items: Vec::new(),
                total: 0,
                offset,
                limit,
            })
        })
    }
}

impl FakeUserRepository {
    fn record_email(&self, email: &str) {
        self.emails
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(email.to_string());
    }
}

fn system_ctx(event_store: Arc<InMemoryEventStore>) -> CommandContext {
    CommandContext::new(
        AuthorizationContext::builder(InstanceId::new("acme"), "tester")
            .token_type(TokenType::System)
            .build(),
        event_store,
    )
}

fn bus(repository: Arc<FakeUserRepository>) -> CommandBus {
    let mut bus = CommandBus::new();
    bus.register::<CreateUserCommand, _>(UserCommandHandler::new(repository.clone()));
    bus.register::<UpdateUserCommand, _>(UserCommandHandler::new(repository.clone()));
    bus.register::<DeactivateUserCommand, _>(UserCommandHandler::new(repository));
    bus
}

#[tokio::test]
async fn create_user_appends_a_created_event_at_version_one() {
    let store = Arc::new(InMemoryEventStore::new());
    let repository = Arc::new(FakeUserRepository::default());
    let bus = bus(Arc::clone(&repository));
    let ctx = system_ctx(Arc::clone(&store));

    let outcome = bus
        .dispatch(
            ctx,
            CreateUserCommand {
                id: AggregateId::new("u-1"),
                username: "alice".to_string(),
                email: "a@x.com".to_string(),
                first_name: "A".to_string(),
                last_name: "B".to_string(),
            },
        )
        .await
        .expect("create succeeds");

    assert_eq!(outcome.new_version.value(), 1);
    assert_eq!(outcome.events_appended, 1);
}

#[tokio::test]
async fn duplicate_create_fails_with_already_exists_and_appends_nothing() {
    let store = Arc::new(InMemoryEventStore::new());
    let repository = Arc::new(FakeUserRepository::default());
    let bus = bus(Arc::clone(&repository));

    let command = || CreateUserCommand {
        id: AggregateId::new("u-1"),
        username: "alice".to_string(),
        email: "a@x.com".to_string(),
        first_name: "A".to_string(),
        last_name: "B".to_string(),
    };

    bus.dispatch(system_ctx(Arc::clone(&store)), command())
        .await
        .expect("first create succeeds");
    repository.record_email("a@x.com");

    let err = bus
        .dispatch(system_ctx(Arc::clone(&store)), command())
        .await
        .expect_err("duplicate create is rejected");
    assert!(matches!(err, CommandError::AlreadyExists(_)));

    let history = store
        .read_aggregate(
            InstanceId::new("acme"),
            "user".to_string(),
            AggregateId::new("u-1"),
            None,
        )
        .await
        .expect("read succeeds");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn update_then_deactivate_advances_through_versions_two_and_three() {
    let store = Arc::new(InMemoryEventStore::new());
    let repository = Arc::new(FakeUserRepository::default());
    let bus = bus(Arc::clone(&repository));

    bus.dispatch(
        system_ctx(Arc::clone(&store)),
        CreateUserCommand {
            id: AggregateId::new("u-1"),
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
        },
    )
    .await
    .expect("create succeeds");
    repository.record_email("a@x.com");

    let updated = bus
        .dispatch(
            system_ctx(Arc::clone(&store)),
            UpdateUserCommand {
                id: AggregateId::new("u-1"),
                email: Some("a2@x.com".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("update succeeds");
    assert_eq!(updated.new_version.value(), 2);

    let deactivated = bus
        .dispatch(
            system_ctx(Arc::clone(&store)),
            DeactivateUserCommand {
                id: AggregateId::new("u-1"),
            },
        )
        .await
        .expect("deactivate succeeds");
    assert_eq!(deactivated.new_version.value(), 3);
}

#[tokio::test]
async fn no_op_update_fails_with_no_changes_and_appends_nothing() {
    let store = Arc::new(InMemoryEventStore::new());
    let repository = Arc::new(FakeUserRepository::default());
    let bus = bus(Arc::clone(&repository));

    bus.dispatch(
        system_ctx(Arc::clone(&store)),
        CreateUserCommand {
            id: AggregateId::new("u-1"),
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
        },
    )
    .await
    .expect("create succeeds");
    repository.record_email("a@x.com");

    let err = bus
        .dispatch(
            system_ctx(Arc::clone(&store)),
            UpdateUserCommand {
                id: AggregateId::new("u-1"),
                email: Some("a@x.com".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect_err("no-op update is rejected");
    assert!(matches!(err, CommandError::NoChanges));

    let history = store
        .read_aggregate(
            InstanceId::new("acme"),
            "user".to_string(),
            AggregateId::new("u-1"),
            None,
        )
        .await
        .expect("read succeeds");
    assert_eq!(history.len(), 1);
}
