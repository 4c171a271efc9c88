//! In-memory organization aggregate state, derived by folding its event
//! history.

use super::events::OrganizationEvent;
use iamcore_core::event_store::StoredEvent;
use iamcore_core::identity::AggregateVersion;

/// Whether an organization accepts mutating commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrganizationState {
    /// Accepts updates and can own projects.
    Active,
    /// Deactivated; rejects further mutating commands.
    Inactive,
}

/// The current state of one organization aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Organization {
    /// The version of the last event folded into this state.
    pub version: AggregateVersion,
    /// Whether the organization accepts mutating commands.
    pub state: OrganizationState,
    /// Unique, URL-safe slug. Immutable after creation.
    pub slug: String,
    /// Current display name.
    pub name: String,
}

impl Organization {
    /// Fold an organization's event history into its current state.
    ///
    /// # Errors
    ///
    /// Returns [`iamcore_core::event::EventError`] if any event's payload
    /// fails to decode, or if the history is corrupt (does not start with a
    /// `Created` event).
    pub fn fold(events: &[StoredEvent]) -> Result<Option<Self>, iamcore_core::event::EventError> {
        let mut state: Option<Self> = None;
        for stored in events {
            let event = OrganizationEvent::decode(&stored.event.event_type, &stored.event.payload)?;
            state = Some(Self::apply(state, &event, stored.aggregate_version)?);
        }
        Ok(state)
    }

    fn apply(
        current: Option<Self>,
        event: &OrganizationEvent,
        version: AggregateVersion,
    ) -> Result<Self, iamcore_core::event::EventError> {
        match (current, event) {
            (None, OrganizationEvent::Created { slug, name }) => Ok(Self {
                version,
                state: OrganizationState::Active,
                slug: slug.clone(),
                name: name.clone(),
            }),
            (Some(mut org), OrganizationEvent::Updated { name }) => {
                org.name.clone_from(name);
                org.version = version;
                Ok(org)
            },
            (Some(mut org), OrganizationEvent::Deactivated) => {
                org.state = OrganizationState::Inactive;
                org.version = version;
                Ok(org)
            },
            (Some(org), OrganizationEvent::Created { .. }) => Ok(org),
            (None, _) => Err(iamcore_core::event::EventError::DeserializationError(
                "organization aggregate history does not start with a Created event".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamcore_core::event::SerializedEvent;
    use iamcore_core::identity::{AggregateId, GlobalPosition, InstanceId};

    fn stored(version: u64, event: &OrganizationEvent) -> StoredEvent {
        StoredEvent {
            instance_id: InstanceId::new("acme"),
            aggregate_type: "organization".to_string(),
            aggregate_id: AggregateId::new("o-1"),
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
        assert!(Organization::fold(&[]).expect("fold succeeds").is_none());
    }

    #[test]
    fn created_then_updated_then_deactivated() {
        let events = vec![
            stored(
                1,
                &OrganizationEvent::Created {
                    slug: "acme".to_string(),
                    name: "Acme".to_string(),
                },
            ),
            stored(
                2,
                &OrganizationEvent::Updated {
                    name: "Acme Corp".to_string(),
                },
            ),
            stored(3, &OrganizationEvent::Deactivated),
        ];

        let org = Organization::fold(&events).expect("fold succeeds").expect("org exists");
        assert_eq!(org.name, "Acme Corp");
        assert_eq!(org.slug, "acme");
        assert_eq!(org.state, OrganizationState::Inactive);
        assert_eq!(org.version, AggregateVersion::new(3));
    }
}
