//! Repository façade: loads aggregates by replay and saves their pending
//! events.
//!
//! Application services use this instead of talking to the stores. The
//! façade never retries: on `DomainError::ConcurrencyConflict` the caller
//! must reload the aggregate and decide again.

use std::sync::Arc;

use uuid::Uuid;

use crate::aggregate::{Aggregate, AggregateState};
use crate::clock::Clock;
use crate::codec::EventCodec;
use crate::error::DomainError;
use crate::publisher::EventPublisher;
use crate::repository::{EventRepository, StoredEvent};
use crate::snapshot::{SnapshotPolicy, SnapshotStore};

/// Loads and saves aggregates of type `S`.
pub struct AggregateRepository<S: AggregateState> {
    events: Arc<dyn EventRepository>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    snapshot_policy: SnapshotPolicy,
    publisher: Option<Arc<dyn EventPublisher>>,
    clock: Arc<dyn Clock>,
    codec: EventCodec<S::Event>,
}

impl<S: AggregateState> std::fmt::Debug for AggregateRepository<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateRepository")
            .field("aggregate_type", &S::AGGREGATE_TYPE)
            .field("snapshots", &self.snapshots.is_some())
            .field("snapshot_policy", &self.snapshot_policy)
            .field("publisher", &self.publisher.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: AggregateState> AggregateRepository<S> {
    /// Creates a repository that replays full histories from `events`.
    #[must_use]
    pub fn new(events: Arc<dyn EventRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            events,
            snapshots: None,
            snapshot_policy: SnapshotPolicy::Never,
            publisher: None,
            clock,
            codec: S::codec(),
        }
    }

    /// Loads from snapshots in `store` and writes new ones per `policy`.
    #[must_use]
    pub fn with_snapshots(mut self, store: Arc<dyn SnapshotStore>, policy: SnapshotPolicy) -> Self {
        self.snapshots = Some(store);
        self.snapshot_policy = policy;
        self
    }

    /// Hands every successfully saved batch to `publisher`.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Returns the codec used to encode and decode events.
    #[must_use]
    pub fn codec(&self) -> &EventCodec<S::Event> {
        &self.codec
    }

    /// Returns the underlying event repository.
    #[must_use]
    pub fn event_repository(&self) -> &dyn EventRepository {
        self.events.as_ref()
    }

    /// Reconstructs an aggregate from its latest snapshot and the events
    /// after it.
    ///
    /// An aggregate with no history comes back fresh at version 0.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if a store is unavailable,
    /// `DomainError::UnknownEventType` or `DomainError::Codec` if an event
    /// cannot be decoded, and structural errors if the stream is out of
    /// order.
    #[tracing::instrument(skip(self), fields(aggregate_type = S::AGGREGATE_TYPE))]
    pub async fn load(&self, aggregate_id: Uuid) -> Result<Aggregate<S>, DomainError> {
        let mut aggregate = self.seed(aggregate_id).await?;
        let stored = self
            .events
            .load_events_after(aggregate_id, aggregate.version())
            .await?;
        let events = self.codec.decode_all(&stored)?;
        aggregate.replay(events)?;
        tracing::debug!(
            version = aggregate.version(),
            snapshot_version = aggregate.snapshot_version(),
            replayed = stored.len(),
            "aggregate loaded"
        );
        Ok(aggregate)
    }

    /// Like [`AggregateRepository::load`] but fails for aggregates with no
    /// history.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the aggregate has no
    /// events, otherwise the errors of [`AggregateRepository::load`].
    pub async fn load_existing(&self, aggregate_id: Uuid) -> Result<Aggregate<S>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.is_new() {
            return Err(DomainError::AggregateNotFound(aggregate_id));
        }
        Ok(aggregate)
    }

    /// Appends the aggregate's pending events and clears them.
    ///
    /// Returns the persisted envelopes; an aggregate with nothing pending
    /// returns an empty list without touching the store. After the append
    /// commits, a snapshot may be taken and the batch is handed to the
    /// publisher; failures in either are logged and do not undo the save.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if another writer appended
    /// first; pending events are kept so the caller can inspect them, but
    /// the aggregate must be reloaded before deciding again.
    #[tracing::instrument(
        skip(self, aggregate),
        fields(
            aggregate_type = S::AGGREGATE_TYPE,
            aggregate_id = %aggregate.id(),
            pending = aggregate.pending_events().len(),
        )
    )]
    pub async fn save(&self, aggregate: &mut Aggregate<S>) -> Result<Vec<StoredEvent>, DomainError> {
        if aggregate.pending_events().is_empty() {
            return Ok(Vec::new());
        }

        let expected_version = aggregate.expected_version();
        let stored = aggregate
            .pending_events()
            .iter()
            .map(|event| self.codec.encode(event))
            .collect::<Result<Vec<_>, _>>()?;

        if let Err(e) = self
            .events
            .append_events(aggregate.id(), expected_version, &stored)
            .await
        {
            tracing::debug!(error = %e, expected_version, "append rejected");
            return Err(e);
        }
        aggregate.clear_pending_events();
        tracing::debug!(version = aggregate.version(), "events appended");

        self.offer_snapshot(aggregate).await;
        self.publish(&stored).await;

        Ok(stored)
    }

    async fn seed(&self, aggregate_id: Uuid) -> Result<Aggregate<S>, DomainError> {
        let Some(store) = &self.snapshots else {
            return Ok(Aggregate::new(aggregate_id));
        };
        let record = match store.load_latest_snapshot(aggregate_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(Aggregate::new(aggregate_id)),
            Err(e) => {
                tracing::warn!(error = %e, "snapshot store unavailable, replaying full history");
                return Ok(Aggregate::new(aggregate_id));
            }
        };
        if record.aggregate_id != aggregate_id
            || record.aggregate_type != S::AGGREGATE_TYPE
            || record.version < 1
        {
            tracing::warn!(
                snapshot_aggregate_id = %record.aggregate_id,
                aggregate_type = %record.aggregate_type,
                version = record.version,
                "ignoring snapshot that does not match this aggregate"
            );
            return Ok(Aggregate::new(aggregate_id));
        }
        match serde_json::from_value::<S>(record.state) {
            Ok(state) => Ok(Aggregate::from_snapshot(aggregate_id, record.version, state)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    version = record.version,
                    "discarding undecodable snapshot, replaying full history"
                );
                Ok(Aggregate::new(aggregate_id))
            }
        }
    }

    async fn offer_snapshot(&self, aggregate: &mut Aggregate<S>) {
        let Some(store) = &self.snapshots else {
            return;
        };
        if !self
            .snapshot_policy
            .should_snapshot(aggregate.version(), aggregate.snapshot_version())
        {
            return;
        }
        let record = match aggregate.snapshot(self.clock.as_ref()) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "snapshot not taken");
                return;
            }
        };
        match store.save_snapshot(&record).await {
            Ok(stored) => {
                if stored {
                    aggregate.mark_snapshot(record.version);
                }
                tracing::debug!(version = record.version, stored, "snapshot offered");
            }
            Err(e) => tracing::warn!(error = %e, version = record.version, "snapshot not saved"),
        }
    }

    async fn publish(&self, stored: &[StoredEvent]) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        if let Err(e) = publisher.publish(stored).await {
            tracing::error!(error = %e, events = stored.len(), "failed to publish persisted events");
        }
    }
}
