//! Aggregate root abstraction and replay engine.
//!
//! An [`Aggregate`] pairs the bookkeeping every aggregate needs (id,
//! version, events raised but not yet saved) with a domain-specific
//! [`AggregateState`]. The state changes only through
//! [`AggregateState::apply`], which is reached either from
//! [`Aggregate::raise`] for new events or from [`Aggregate::replay`] for
//! persisted ones.

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::clock::Clock;
use crate::codec::EventCodec;
use crate::error::DomainError;
use crate::event::{Event, EventKind, EventMetadata};
use crate::snapshot::SnapshotRecord;

/// Whether an event is being applied for the first time or replayed from
/// storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// The event was just raised by a behaviour.
    Live,
    /// The event is being folded back in from history.
    Replay,
}

impl ApplyMode {
    /// Returns `true` when replaying history.
    #[must_use]
    pub fn is_replay(self) -> bool {
        matches!(self, Self::Replay)
    }
}

/// Derived state of one aggregate type.
///
/// Implementations hold only fields computed from events. `apply` must be
/// a pure transition: it never fails, never raises events and never does
/// I/O. Side effects that should happen once per event (logging, for
/// example) are gated on [`ApplyMode::Live`].
pub trait AggregateState:
    Default + Clone + std::fmt::Debug + Send + Sync + Serialize + DeserializeOwned
{
    /// The event type this aggregate produces and consumes.
    type Event: EventKind;

    /// Aggregate type name stored alongside every event and snapshot.
    const AGGREGATE_TYPE: &'static str;

    /// Builds the codec that knows every event type of this aggregate.
    fn codec() -> EventCodec<Self::Event>;

    /// Apply an event to mutate internal state.
    fn apply(&mut self, event: &Event<Self::Event>, mode: ApplyMode);
}

/// An aggregate instance: identity, version and derived state.
#[derive(Debug, Clone)]
pub struct Aggregate<S: AggregateState> {
    id: Uuid,
    version: i64,
    snapshot_version: i64,
    state: S,
    pending_events: Vec<Event<S::Event>>,
}

impl<S: AggregateState> Aggregate<S> {
    /// Creates an aggregate with no history (version 0).
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: 0,
            snapshot_version: 0,
            state: S::default(),
            pending_events: Vec::new(),
        }
    }

    /// Seeds an aggregate from state materialized at `version`.
    ///
    /// Only events with a sequence number above `version` may be replayed
    /// on top of it.
    #[must_use]
    pub fn from_snapshot(id: Uuid, version: i64, state: S) -> Self {
        Self {
            id,
            version,
            snapshot_version: version,
            state,
            pending_events: Vec::new(),
        }
    }

    /// Returns the aggregate identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the version of the last applied event.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns the version of the snapshot this aggregate was last seeded
    /// from or saved to, 0 if none.
    #[must_use]
    pub fn snapshot_version(&self) -> i64 {
        self.snapshot_version
    }

    /// Returns the derived state.
    #[must_use]
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Returns events raised but not yet persisted.
    #[must_use]
    pub fn pending_events(&self) -> &[Event<S::Event>] {
        &self.pending_events
    }

    /// The stored version a save must find: the version before any
    /// pending event was raised.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn expected_version(&self) -> i64 {
        self.version - self.pending_events.len() as i64
    }

    /// Whether no event has ever been applied.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.version == 0
    }

    /// Applies one event after checking it continues this aggregate's
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateMismatch` if the event belongs to
    /// another aggregate and `DomainError::VersionConflict` if its sequence
    /// number is not exactly `version + 1`. State is untouched on error.
    pub fn apply(&mut self, event: &Event<S::Event>, mode: ApplyMode) -> Result<(), DomainError> {
        if event.metadata.aggregate_id != self.id {
            return Err(DomainError::AggregateMismatch {
                expected: self.id,
                actual: event.metadata.aggregate_id,
            });
        }
        let expected = self.version + 1;
        if event.metadata.sequence_number != expected {
            return Err(DomainError::VersionConflict {
                aggregate_id: self.id,
                expected,
                actual: event.metadata.sequence_number,
            });
        }
        self.state.apply(event, mode);
        self.version = expected;
        Ok(())
    }

    /// Folds persisted events in ascending order without recording them as
    /// pending.
    ///
    /// # Errors
    ///
    /// Stops at the first event [`Aggregate::apply`] rejects.
    pub fn replay<I>(&mut self, events: I) -> Result<(), DomainError>
    where
        I: IntoIterator<Item = Event<S::Event>>,
    {
        for event in events {
            self.apply(&event, ApplyMode::Replay)?;
        }
        Ok(())
    }

    /// Records a new event at `version + 1`, applies it live and queues it
    /// for persistence.
    ///
    /// Behaviours validate their preconditions before calling this; once
    /// called, the event is part of the aggregate's pending history.
    ///
    /// # Errors
    ///
    /// Propagates structural errors from [`Aggregate::apply`].
    pub fn raise(
        &mut self,
        kind: S::Event,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let event = Event {
            metadata: EventMetadata {
                event_id: Uuid::now_v7(),
                aggregate_id: self.id,
                sequence_number: self.version + 1,
                correlation_id,
                causation_id: correlation_id,
                occurred_at: clock.now(),
            },
            kind,
        };
        self.apply(&event, ApplyMode::Live)?;
        self.pending_events.push(event);
        Ok(())
    }

    /// Removes and returns the pending events.
    pub fn take_pending_events(&mut self) -> Vec<Event<S::Event>> {
        std::mem::take(&mut self.pending_events)
    }

    /// Clears pending events after persistence.
    pub fn clear_pending_events(&mut self) {
        self.pending_events.clear();
    }

    /// Materializes the current state as a snapshot record.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Codec` if the state cannot be serialized.
    pub fn snapshot(&self, clock: &dyn Clock) -> Result<SnapshotRecord, DomainError> {
        let state = serde_json::to_value(&self.state).map_err(|e| {
            DomainError::Codec(format!(
                "failed to encode {} snapshot of {}: {e}",
                S::AGGREGATE_TYPE,
                self.id
            ))
        })?;
        Ok(SnapshotRecord {
            aggregate_id: self.id,
            aggregate_type: S::AGGREGATE_TYPE.to_owned(),
            version: self.version,
            state,
            taken_at: clock.now(),
        })
    }

    pub(crate) fn mark_snapshot(&mut self, version: i64) {
        self.snapshot_version = version;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::Deserialize;

    use super::*;

    #[derive(Debug)]
    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum TallyEventKind {
        Opened { label: String },
        Incremented { by: u32 },
    }

    impl EventKind for TallyEventKind {
        fn event_type(&self) -> &'static str {
            match self {
                Self::Opened { .. } => "tally.opened",
                Self::Incremented { .. } => "tally.incremented",
            }
        }

        fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
            serde_json::to_value(self)
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Tally {
        label: String,
        total: u32,
        #[serde(skip)]
        live_applications: u32,
    }

    impl AggregateState for Tally {
        type Event = TallyEventKind;

        const AGGREGATE_TYPE: &'static str = "tally";

        fn codec() -> EventCodec<Self::Event> {
            EventCodec::new(Self::AGGREGATE_TYPE)
                .register("tally.opened", serde_json::from_value)
                .register("tally.incremented", serde_json::from_value)
        }

        fn apply(&mut self, event: &Event<Self::Event>, mode: ApplyMode) {
            match &event.kind {
                TallyEventKind::Opened { label } => self.label.clone_from(label),
                TallyEventKind::Incremented { by } => self.total += by,
            }
            if !mode.is_replay() {
                self.live_applications += 1;
            }
        }
    }

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }

    fn history(id: Uuid) -> Vec<Event<TallyEventKind>> {
        let mut tally = Aggregate::<Tally>::new(id);
        let clock = clock();
        tally
            .raise(
                TallyEventKind::Opened {
                    label: "visits".to_owned(),
                },
                Uuid::new_v4(),
                &clock,
            )
            .unwrap();
        for by in [1, 2, 3, 4] {
            tally
                .raise(TallyEventKind::Incremented { by }, Uuid::new_v4(), &clock)
                .unwrap();
        }
        tally.take_pending_events()
    }

    #[test]
    fn test_new_aggregate_starts_at_version_zero() {
        let tally = Aggregate::<Tally>::new(Uuid::new_v4());

        assert_eq!(tally.version(), 0);
        assert!(tally.is_new());
        assert!(tally.pending_events().is_empty());
        assert_eq!(tally.state(), &Tally::default());
    }

    #[test]
    fn test_raise_applies_event_and_queues_it() {
        // Arrange
        let id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        let clock = clock();
        let mut tally = Aggregate::<Tally>::new(id);

        // Act
        tally
            .raise(
                TallyEventKind::Opened {
                    label: "visits".to_owned(),
                },
                correlation_id,
                &clock,
            )
            .unwrap();

        // Assert
        assert_eq!(tally.version(), 1);
        assert_eq!(tally.state().label, "visits");
        assert_eq!(tally.state().live_applications, 1);
        assert_eq!(tally.expected_version(), 0);

        let events = tally.pending_events();
        assert_eq!(events.len(), 1);
        let meta = &events[0].metadata;
        assert_eq!(meta.aggregate_id, id);
        assert_eq!(meta.sequence_number, 1);
        assert_eq!(meta.correlation_id, correlation_id);
        assert_eq!(meta.causation_id, correlation_id);
        assert_eq!(meta.occurred_at, clock.0);
    }

    #[test]
    fn test_replay_does_not_queue_events_or_run_live_effects() {
        let id = Uuid::new_v4();
        let mut tally = Aggregate::<Tally>::new(id);

        tally.replay(history(id)).unwrap();

        assert_eq!(tally.version(), 5);
        assert_eq!(tally.state().total, 10);
        assert_eq!(tally.state().live_applications, 0);
        assert!(tally.pending_events().is_empty());
        assert_eq!(tally.expected_version(), 5);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let id = Uuid::new_v4();
        let events = history(id);

        let mut first = Aggregate::<Tally>::new(id);
        first.replay(events.clone()).unwrap();
        let mut second = Aggregate::<Tally>::new(id);
        second.replay(events).unwrap();

        assert_eq!(first.state(), second.state());
        assert_eq!(first.version(), second.version());
    }

    #[test]
    fn test_seeding_from_snapshot_matches_full_replay() {
        // Arrange
        let id = Uuid::new_v4();
        let events = history(id);
        let mut full = Aggregate::<Tally>::new(id);
        full.replay(events.clone()).unwrap();

        let mut prefix = Aggregate::<Tally>::new(id);
        prefix.replay(events[..2].to_vec()).unwrap();
        let record = prefix.snapshot(&clock()).unwrap();

        // Act
        let state: Tally = serde_json::from_value(record.state).unwrap();
        let mut seeded = Aggregate::from_snapshot(id, record.version, state);
        seeded.replay(events[2..].to_vec()).unwrap();

        // Assert
        assert_eq!(seeded.state(), full.state());
        assert_eq!(seeded.version(), full.version());
        assert_eq!(seeded.snapshot_version(), 2);
    }

    #[test]
    fn test_apply_rejects_event_of_another_aggregate() {
        let mut tally = Aggregate::<Tally>::new(Uuid::new_v4());
        let foreign = history(Uuid::new_v4()).remove(0);

        let result = tally.apply(&foreign, ApplyMode::Replay);

        assert!(matches!(result, Err(DomainError::AggregateMismatch { .. })));
        assert_eq!(tally.version(), 0);
    }

    #[test]
    fn test_apply_rejects_duplicate_and_out_of_order_events() {
        // Arrange
        let id = Uuid::new_v4();
        let events = history(id);
        let mut tally = Aggregate::<Tally>::new(id);
        tally.apply(&events[0], ApplyMode::Replay).unwrap();

        // Act
        let duplicate = tally.apply(&events[0], ApplyMode::Replay);
        let skipped = tally.apply(&events[2], ApplyMode::Replay);

        // Assert
        match duplicate {
            Err(DomainError::VersionConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("expected VersionConflict, got {other:?}"),
        }
        assert!(matches!(
            skipped,
            Err(DomainError::VersionConflict {
                expected: 2,
                actual: 3,
                ..
            })
        ));
        assert_eq!(tally.version(), 1);
        assert_eq!(tally.state().total, 0);
    }

    #[test]
    fn test_raise_after_replay_continues_the_stream() {
        let id = Uuid::new_v4();
        let mut tally = Aggregate::<Tally>::new(id);
        tally.replay(history(id)).unwrap();

        tally
            .raise(TallyEventKind::Incremented { by: 5 }, Uuid::new_v4(), &clock())
            .unwrap();

        assert_eq!(tally.version(), 6);
        assert_eq!(tally.expected_version(), 5);
        assert_eq!(tally.pending_events()[0].metadata.sequence_number, 6);
        assert_eq!(tally.state().total, 15);
    }

    #[test]
    fn test_snapshot_captures_version_and_type() {
        let id = Uuid::new_v4();
        let mut tally = Aggregate::<Tally>::new(id);
        tally.replay(history(id)).unwrap();

        let record = tally.snapshot(&clock()).unwrap();

        assert_eq!(record.aggregate_id, id);
        assert_eq!(record.aggregate_type, "tally");
        assert_eq!(record.version, 5);
        assert_eq!(record.state["total"], 10);
    }
}
