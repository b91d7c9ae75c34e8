//! The person aggregate: derived state and behaviours.

use serde::{Deserialize, Serialize};
use strata_core::aggregate::{Aggregate, AggregateState, ApplyMode};
use strata_core::clock::Clock;
use strata_core::codec::EventCodec;
use strata_core::error::DomainError;
use strata_core::event::Event;
use uuid::Uuid;

use super::events::{
    PERSON_AGGREGATE_TYPE, PersonCreated, PersonEventKind, PersonFinalized, PersonNameChanged,
    PersonNameReverted, person_codec,
};

/// State of a person, derived entirely from its events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonState {
    /// Current name; empty until created.
    pub name: String,
    /// Whether `person.created` has been applied.
    pub created: bool,
    /// Whether the person has been finalized.
    pub finalized: bool,
    /// Names replaced by renames, oldest first. Reverting pops the last.
    pub previous_names: Vec<String>,
    /// Number of renames applied, reverts excluded.
    pub rename_count: u32,
}

impl AggregateState for PersonState {
    type Event = PersonEventKind;

    const AGGREGATE_TYPE: &'static str = PERSON_AGGREGATE_TYPE;

    fn codec() -> EventCodec<Self::Event> {
        person_codec()
    }

    fn apply(&mut self, event: &Event<Self::Event>, mode: ApplyMode) {
        match &event.kind {
            PersonEventKind::Created(payload) => {
                self.name.clone_from(&payload.name);
                self.created = true;
            }
            PersonEventKind::NameChanged(payload) => {
                let previous = std::mem::replace(&mut self.name, payload.name.clone());
                self.previous_names.push(previous);
                self.rename_count += 1;
            }
            PersonEventKind::NameReverted(payload) => {
                self.previous_names.pop();
                self.name.clone_from(&payload.name);
            }
            PersonEventKind::Finalized(_) => {
                self.finalized = true;
            }
        }
        if !mode.is_replay() {
            tracing::info!(
                person_id = %event.aggregate_id(),
                version = event.sequence_number(),
                event_type = event.event_type(),
                "person changed"
            );
        }
    }
}

fn validated_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::Validation(
            "person name must not be empty".to_owned(),
        ));
    }
    Ok(name.to_owned())
}

/// Business operations on a person. Each checks its preconditions and
/// raises exactly one event, or fails leaving the aggregate untouched.
pub trait PersonBehaviour {
    /// Registers the person under `name`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a blank name and
    /// `DomainError::InvalidStateTransition` if the person already exists.
    fn create(
        &mut self,
        name: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError>;

    /// Changes the person's name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a blank name and
    /// `DomainError::InvalidStateTransition` if the person does not exist or
    /// is finalized.
    fn rename(
        &mut self,
        name: &str,
        reason: Option<String>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError>;

    /// Undoes the latest rename by restoring the previous name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidStateTransition` if the person is
    /// finalized or has no earlier name to go back to.
    fn revert_name(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError>;

    /// Closes the person's record; no further renames are accepted.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidStateTransition` if the person does not
    /// exist or is already finalized.
    fn finalize(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError>;
}

impl PersonBehaviour for Aggregate<PersonState> {
    fn create(
        &mut self,
        name: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let name = validated_name(name)?;
        if self.state().created {
            return Err(DomainError::InvalidStateTransition(format!(
                "person {} already exists",
                self.id()
            )));
        }
        self.raise(
            PersonEventKind::Created(PersonCreated { name }),
            correlation_id,
            clock,
        )
    }

    fn rename(
        &mut self,
        name: &str,
        reason: Option<String>,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let name = validated_name(name)?;
        let state = self.state();
        if !state.created {
            return Err(DomainError::InvalidStateTransition(format!(
                "person {} does not exist",
                self.id()
            )));
        }
        if state.finalized {
            return Err(DomainError::InvalidStateTransition(format!(
                "cannot rename finalized person {}",
                self.id()
            )));
        }
        let reason = reason
            .map(|r| r.trim().to_owned())
            .filter(|r| !r.is_empty());
        self.raise(
            PersonEventKind::NameChanged(PersonNameChanged { name, reason }),
            correlation_id,
            clock,
        )
    }

    fn revert_name(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        let state = self.state();
        if state.finalized {
            return Err(DomainError::InvalidStateTransition(format!(
                "cannot revert name of finalized person {}",
                self.id()
            )));
        }
        let Some(previous) = state.previous_names.last().cloned() else {
            return Err(DomainError::InvalidStateTransition(format!(
                "person {} has no previous name",
                self.id()
            )));
        };
        self.raise(
            PersonEventKind::NameReverted(PersonNameReverted { name: previous }),
            correlation_id,
            clock,
        )
    }

    fn finalize(&mut self, correlation_id: Uuid, clock: &dyn Clock) -> Result<(), DomainError> {
        let state = self.state();
        if !state.created {
            return Err(DomainError::InvalidStateTransition(format!(
                "person {} does not exist",
                self.id()
            )));
        }
        if state.finalized {
            return Err(DomainError::InvalidStateTransition(format!(
                "person {} is already finalized",
                self.id()
            )));
        }
        self.raise(
            PersonEventKind::Finalized(PersonFinalized {}),
            correlation_id,
            clock,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use strata_core::aggregate_repository::AggregateRepository;
    use strata_core::repository::EventRepository;
    use strata_core::snapshot::{SnapshotPolicy, SnapshotStore};
    use strata_event_store::in_memory::{InMemoryEventRepository, InMemorySnapshotStore};
    use strata_test_support::{FixedClock, fixed_clock};

    use super::*;

    fn created_person(name: &str, clock: &FixedClock) -> Aggregate<PersonState> {
        let mut person = Aggregate::<PersonState>::new(Uuid::new_v4());
        person.create(name, Uuid::new_v4(), clock).unwrap();
        person
    }

    #[test]
    fn test_create_raises_created_event_at_version_one() {
        // Arrange
        let clock = fixed_clock();
        let correlation_id = Uuid::new_v4();
        let mut person = Aggregate::<PersonState>::new(Uuid::new_v4());

        // Act
        person.create("  john ", correlation_id, &clock).unwrap();

        // Assert
        assert_eq!(person.version(), 1);
        assert_eq!(person.state().name, "john");
        assert!(person.state().created);
        let pending = person.pending_events();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type(), "person.created");
        assert_eq!(pending[0].sequence_number(), 1);
        assert_eq!(pending[0].metadata.correlation_id, correlation_id);
        assert_eq!(pending[0].metadata.occurred_at, clock.0);
    }

    #[test]
    fn test_create_twice_is_an_invalid_transition() {
        let clock = fixed_clock();
        let mut person = created_person("john", &clock);

        let result = person.create("john again", Uuid::new_v4(), &clock);

        assert!(matches!(result, Err(DomainError::InvalidStateTransition(_))));
        assert_eq!(person.version(), 1);
        assert_eq!(person.pending_events().len(), 1);
    }

    #[test]
    fn test_blank_name_is_a_validation_error() {
        let clock = fixed_clock();
        let mut person = Aggregate::<PersonState>::new(Uuid::new_v4());

        let result = person.create("   ", Uuid::new_v4(), &clock);

        match result {
            Err(DomainError::Validation(msg)) => assert_eq!(msg, "person name must not be empty"),
            other => panic!("expected Validation, got {other:?}"),
        }
        assert!(person.is_new());
    }

    #[test]
    fn test_rename_before_create_is_an_invalid_transition() {
        let clock = fixed_clock();
        let mut person = Aggregate::<PersonState>::new(Uuid::new_v4());

        let result = person.rename("john", None, Uuid::new_v4(), &clock);

        assert!(matches!(result, Err(DomainError::InvalidStateTransition(_))));
        assert_eq!(person.version(), 0);
    }

    #[test]
    fn test_rename_tracks_previous_names() {
        // Arrange
        let clock = fixed_clock();
        let mut person = created_person("john", &clock);

        // Act
        person
            .rename("john doe", Some("full name".to_owned()), Uuid::new_v4(), &clock)
            .unwrap();
        person.rename("jd", Some("  ".to_owned()), Uuid::new_v4(), &clock).unwrap();

        // Assert
        let state = person.state();
        assert_eq!(state.name, "jd");
        assert_eq!(state.previous_names, vec!["john".to_owned(), "john doe".to_owned()]);
        assert_eq!(state.rename_count, 2);
        assert_eq!(person.version(), 3);
        assert_eq!(
            person.pending_events()[2].kind,
            PersonEventKind::NameChanged(PersonNameChanged {
                name: "jd".to_owned(),
                reason: None,
            })
        );
    }

    #[test]
    fn test_revert_name_restores_previous_name_with_a_new_event() {
        // Arrange
        let clock = fixed_clock();
        let mut person = created_person("john", &clock);
        person.rename("john doe", None, Uuid::new_v4(), &clock).unwrap();

        // Act
        person.revert_name(Uuid::new_v4(), &clock).unwrap();

        // Assert
        assert_eq!(person.state().name, "john");
        assert!(person.state().previous_names.is_empty());
        assert_eq!(person.state().rename_count, 1);
        assert_eq!(person.version(), 3);
        let types: Vec<&str> = person.pending_events().iter().map(Event::event_type).collect();
        assert_eq!(
            types,
            vec!["person.created", "person.name_changed", "person.name_reverted"]
        );
    }

    #[test]
    fn test_revert_without_previous_name_is_an_invalid_transition() {
        let clock = fixed_clock();
        let mut person = created_person("john", &clock);

        let result = person.revert_name(Uuid::new_v4(), &clock);

        assert!(matches!(result, Err(DomainError::InvalidStateTransition(_))));
        assert_eq!(person.version(), 1);
    }

    #[test]
    fn test_rename_after_finalize_is_an_invalid_transition() {
        // Arrange
        let clock = fixed_clock();
        let mut person = created_person("john", &clock);
        person.finalize(Uuid::new_v4(), &clock).unwrap();

        // Act
        let result = person.rename("x", None, Uuid::new_v4(), &clock);

        // Assert
        match result {
            Err(DomainError::InvalidStateTransition(msg)) => {
                assert!(msg.contains("finalized"), "unexpected message: {msg}");
            }
            other => panic!("expected InvalidStateTransition, got {other:?}"),
        }
        assert_eq!(person.version(), 2);
        assert_eq!(person.state().name, "john");
        assert_eq!(person.pending_events().len(), 2);
    }

    #[test]
    fn test_finalize_twice_is_an_invalid_transition() {
        let clock = fixed_clock();
        let mut person = created_person("john", &clock);
        person.finalize(Uuid::new_v4(), &clock).unwrap();

        let result = person.finalize(Uuid::new_v4(), &clock);

        assert!(matches!(result, Err(DomainError::InvalidStateTransition(_))));
    }

    #[test]
    fn test_replay_of_raised_events_reproduces_state() {
        // Arrange
        let clock = fixed_clock();
        let mut live = created_person("john", &clock);
        live.rename("john doe", None, Uuid::new_v4(), &clock).unwrap();
        live.rename("johnny", None, Uuid::new_v4(), &clock).unwrap();
        live.revert_name(Uuid::new_v4(), &clock).unwrap();
        live.finalize(Uuid::new_v4(), &clock).unwrap();
        let history = live.pending_events().to_vec();

        // Act
        let mut first = Aggregate::<PersonState>::new(live.id());
        first.replay(history.clone()).unwrap();
        let mut second = Aggregate::<PersonState>::new(live.id());
        second.replay(history).unwrap();

        // Assert
        assert_eq!(first.state(), live.state());
        assert_eq!(first.state(), second.state());
        assert_eq!(first.version(), 5);
        assert!(first.pending_events().is_empty());
    }

    #[tokio::test]
    async fn test_john_becomes_john_doe_through_the_store() {
        // Arrange
        let clock = Arc::new(fixed_clock());
        let events = Arc::new(InMemoryEventRepository::new());
        let repo = AggregateRepository::<PersonState>::new(events.clone(), clock.clone());
        let id = Uuid::new_v4();
        let mut person = repo.load(id).await.unwrap();

        // Act
        person.create("john", Uuid::new_v4(), clock.as_ref()).unwrap();
        assert_eq!(person.version(), 1);
        person
            .rename("john doe", None, Uuid::new_v4(), clock.as_ref())
            .unwrap();
        assert_eq!(person.version(), 2);
        repo.save(&mut person).await.unwrap();

        // Assert
        let stored = events.load_events(id).await.unwrap();
        let decoded = repo.codec().decode_all(&stored).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].sequence_number(), 1);
        assert_eq!(
            decoded[0].kind,
            PersonEventKind::Created(PersonCreated {
                name: "john".to_owned()
            })
        );
        assert_eq!(decoded[1].sequence_number(), 2);
        assert_eq!(
            decoded[1].kind,
            PersonEventKind::NameChanged(PersonNameChanged {
                name: "john doe".to_owned(),
                reason: None,
            })
        );

        let loaded = repo.load(id).await.unwrap();
        assert_eq!(loaded.state().name, "john doe");
        assert_eq!(loaded.version(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_seeded_load_matches_full_replay() {
        // Arrange
        let clock = Arc::new(fixed_clock());
        let events = Arc::new(InMemoryEventRepository::new());
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let with_snapshots = AggregateRepository::<PersonState>::new(events.clone(), clock.clone())
            .with_snapshots(snapshots.clone(), SnapshotPolicy::EveryNEvents(3));
        let replay_only = AggregateRepository::<PersonState>::new(events, clock.clone());
        let id = Uuid::new_v4();

        let mut person = with_snapshots.load(id).await.unwrap();
        person.create("john", Uuid::new_v4(), clock.as_ref()).unwrap();
        for name in ["a", "b", "c"] {
            person.rename(name, None, Uuid::new_v4(), clock.as_ref()).unwrap();
        }
        with_snapshots.save(&mut person).await.unwrap();
        person.revert_name(Uuid::new_v4(), clock.as_ref()).unwrap();
        with_snapshots.save(&mut person).await.unwrap();

        // Act
        let seeded = with_snapshots.load(id).await.unwrap();
        let replayed = replay_only.load(id).await.unwrap();

        // Assert
        let snapshot = snapshots.load_latest_snapshot(id).await.unwrap().unwrap();
        assert_eq!(snapshot.version, 4);
        assert_eq!(seeded.snapshot_version(), 4);
        assert_eq!(seeded.version(), 5);
        assert_eq!(seeded.state(), replayed.state());
        assert_eq!(seeded.version(), replayed.version());
        assert_eq!(seeded.state().name, "b");
    }
}
