//! In-memory project aggregate state, derived by folding its event history.

use super::events::ProjectEvent;
use iamcore_core::event_store::StoredEvent;
use iamcore_core::identity::AggregateVersion;

/// Whether a project accepts mutating commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectState {
    /// Accepts updates.
    Active,
    /// Deactivated; rejects further mutating commands.
    Inactive,
}

/// The current state of one project aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    /// The version of the last event folded into this state.
    pub version: AggregateVersion,
    /// Whether the project accepts mutating commands.
    pub state: ProjectState,
    /// The owning organization's aggregate id. Immutable after creation.
    pub organization_id: String,
    /// Unique slug within the owning organization. Immutable after creation.
    pub slug: String,
    /// Current display name.
    pub name: String,
}

impl Project {
    /// Fold a project's event history into its current state.
    ///
    /// # Errors
    ///
    /// Returns [`iamcore_core::event::EventError`] if any event's payload
    /// fails to decode, or if the history is corrupt (does not start with a
    /// `Created` event).
    pub fn fold(events: &[StoredEvent]) -> Result<Option<Self>, iamcore_core::event::EventError> {
        let mut state: Option<Self> = None;
        for stored in events {
            let event = ProjectEvent::decode(&stored.event.event_type, &stored.event.payload)?;
            state = Some(Self::apply(state, &event, stored.aggregate_version)?);
        }
        Ok(state)
    }

    fn apply(
        current: Option<Self>,
        event: &ProjectEvent,
        version: AggregateVersion,
    ) -> Result<Self, iamcore_core::event::EventError> {
        match (current, event) {
            (
                None,
                ProjectEvent::Created {
                    organization_id,
                    slug,
                    name,
                },
            ) => Ok(Self {
                version,
                state: ProjectState::Active,
                organization_id: organization_id.clone(),
                slug: slug.clone(),
                name: name.clone(),
            }),
            (Some(mut project), ProjectEvent::Updated { name }) => {
                project.name.clone_from(name);
                project.version = version;
                Ok(project)
            },
            (Some(mut project), ProjectEvent::Deactivated) => {
                project.state = ProjectState::Inactive;
                project.version = version;
                Ok(project)
            },
            (Some(project), ProjectEvent::Created { .. }) => Ok(project),
            (None, _) => Err(iamcore_core::event::EventError::DeserializationError(
                "project aggregate history does not start with a Created event".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamcore_core::event::SerializedEvent;
    use iamcore_core::identity::{AggregateId, GlobalPosition, InstanceId};

    fn stored(version: u64, event: &ProjectEvent) -> StoredEvent {
        StoredEvent {
            instance_id: InstanceId::new("acme"),
            aggregate_type: "project".to_string(),
            aggregate_id: AggregateId::new("p-1"),
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
        assert!(Project::fold(&[]).expect("fold succeeds").is_none());
    }

    #[test]
    fn created_then_updated_then_deactivated() {
        let events = vec![
            stored(
                1,
                &ProjectEvent::Created {
                    organization_id: "o-1".to_string(),
                    slug: "web".to_string(),
                    name: "Web".to_string(),
                },
            ),
            stored(
                2,
                &ProjectEvent::Updated {
                    name: "Web App".to_string(),
                },
            ),
            stored(3, &ProjectEvent::Deactivated),
        ];

        let project = Project::fold(&events).expect("fold succeeds").expect("project exists");
        assert_eq!(project.name, "Web App");
        assert_eq!(project.organization_id, "o-1");
        assert_eq!(project.state, ProjectState::Inactive);
        assert_eq!(project.version, AggregateVersion::new(3));
    }
}
