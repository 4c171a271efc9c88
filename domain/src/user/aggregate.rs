//! In-memory user aggregate state, derived by folding its event history.

use super::events::UserEvent;
use iamcore_core::event_store::StoredEvent;
use iamcore_core::identity::AggregateVersion;

/// Whether a user accepts mutating commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    /// Accepts updates and can be deactivated.
    Active,
    /// Deactivated; rejects further mutating commands.
    Inactive,
}

/// The current state of one user aggregate, derived by folding its events
/// in version order. Never persisted directly — this exists only for the
/// duration of one command's handling.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    /// The version of the last event folded into this state.
    pub version: AggregateVersion,
    /// Whether the user accepts mutating commands.
    pub state: UserState,
    /// Login name. Immutable after creation.
    pub username: String,
    /// Current email.
    pub email: String,
    /// Current given name.
    pub first_name: String,
    /// Current family name.
    pub last_name: String,
}

impl User {
    /// Fold a user's event history into its current state.
    ///
    /// Returns `None` if `events` is empty (the aggregate does not exist
    /// yet). Events must already be in ascending version order, which is
    /// the order [`iamcore_core::event_store::EventStore::read_aggregate`]
    /// guarantees.
    ///
    /// # Errors
    ///
    /// Returns [`iamcore_core::event::EventError`] if any event's payload
    /// fails to decode.
    pub fn fold(events: &[StoredEvent]) -> Result<Option<Self>, iamcore_core::event::EventError> {
        let mut state: Option<Self> = None;
        for stored in events {
            let event = UserEvent::decode(&stored.event.event_type, &stored.event.payload)?;
            state = Some(Self::apply(state, &event, stored.aggregate_version)?);
        }
        Ok(state)
    }

    fn apply(
        current: Option<Self>,
        event: &UserEvent,
        version: AggregateVersion,
    ) -> Result<Self, iamcore_core::event::EventError> {
        match (current, event) {
            (
                None,
                UserEvent::Created {
                    username,
                    email,
                    first_name,
                    last_name,
                },
            ) => Ok(Self {
                version,
                state: UserState::Active,
                username: username.clone(),
                email: email.clone(),
                first_name: first_name.clone(),
                last_name: last_name.clone(),
            }),
            (
                Some(mut user),
                UserEvent::Updated {
                    email,
                    first_name,
                    last_name,
                },
            ) => {
                if let Some(email) = email {
                    user.email.clone_from(email);
                }
                if let Some(first_name) = first_name {
                    user.first_name.clone_from(first_name);
                }
                if let Some(last_name) = last_name {
                    user.last_name.clone_from(last_name);
                }
                user.version = version;
                Ok(user)
            },
            (Some(mut user), UserEvent::Deactivated) => {
                user.state = UserState::Inactive;
                user.version = version;
                Ok(user)
            },
            // A second `Created` for an aggregate that already has state
            // would mean the eventstore handed back a corrupt history; the
            // PK uniqueness constraint on (instance, type, id, version)
            // prevents this in any real store.
            (Some(user), UserEvent::Created { .. }) => Ok(user),
            (None, _) => Err(iamcore_core::event::EventError::DeserializationError(
                "user aggregate history does not start with a Created event".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamcore_core::event::SerializedEvent;
    use iamcore_core::identity::{AggregateId, GlobalPosition, InstanceId};

    fn stored(version: u64, event: &UserEvent) -> StoredEvent {
        StoredEvent {
            instance_id: InstanceId::new("acme"),
            aggregate_type: "user".to_string(),
            aggregate_id: AggregateId::new("u-1"),
            aggregate_version: AggregateVersion::new(version),
            global_position: GlobalPosition::new(i64::try_from(version).unwrap_or(0), 0),
            event: SerializedEvent::new(
                event.event_type().to_string(),
                serde_json::to_value(event).expect("serialize"),
                None,
            ),
        }
    }

    #[test]
    fn empty_history_has_no_state() {
        let state = User::fold(&[]).expect("fold succeeds");
        assert!(state.is_none());
    }

    #[test]
    fn created_then_updated_then_deactivated() {
        let events = vec![
            stored(
                1,
                &UserEvent::Created {
                    username: "alice".to_string(),
                    email: "a@x.com".to_string(),
                    first_name: "A".to_string(),
                    last_name: "B".to_string(),
                },
            ),
            stored(
                2,
                &UserEvent::Updated {
                    email: Some("a2@x.com".to_string()),
                    first_name: None,
                    last_name: None,
                },
            ),
            stored(3, &UserEvent::Deactivated),
        ];

        let user = User::fold(&events).expect("fold succeeds").expect("user exists");
        assert_eq!(user.email, "a2@x.com");
        assert_eq!(user.first_name, "A");
        assert_eq!(user.state, UserState::Inactive);
        assert_eq!(user.version, AggregateVersion::new(3));
    }
}
