//! In-memory storage engines.
//!
//! Used by the CLI's `--in-memory` mode and by tests. Each aggregate
//! stream sits behind its own mutex, so appends to one aggregate are
//! serialized while appends to different aggregates only contend on the
//! brief map lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use strata_core::error::DomainError;
use strata_core::repository::{EventRepository, StoredEvent, validate_batch};
use strata_core::snapshot::{SnapshotRecord, SnapshotStore};

type Stream = Arc<Mutex<Vec<StoredEvent>>>;

fn poisoned() -> DomainError {
    DomainError::Infrastructure("in-memory store lock poisoned".into())
}

/// Event repository holding every stream in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventRepository {
    streams: Arc<RwLock<HashMap<Uuid, Stream>>>,
}

impl InMemoryEventRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn stream(&self, aggregate_id: Uuid) -> Result<Option<Stream>, DomainError> {
        let streams = self.streams.read().map_err(|_| poisoned())?;
        Ok(streams.get(&aggregate_id).cloned())
    }

    fn stream_or_insert(&self, aggregate_id: Uuid) -> Result<Stream, DomainError> {
        if let Some(stream) = self.stream(aggregate_id)? {
            return Ok(stream);
        }
        let mut streams = self.streams.write().map_err(|_| poisoned())?;
        Ok(Arc::clone(streams.entry(aggregate_id).or_default()))
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let Some(stream) = self.stream(aggregate_id)? else {
            return Ok(Vec::new());
        };
        let events = stream.lock().map_err(|_| poisoned())?;
        Ok(events.clone())
    }

    async fn load_events_after(
        &self,
        aggregate_id: Uuid,
        after_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let Some(stream) = self.stream(aggregate_id)? else {
            return Ok(Vec::new());
        };
        let events = stream.lock().map_err(|_| poisoned())?;
        // Versions start at 1 and are gapless, so the index is version - 1.
        let skip = usize::try_from(after_version.max(0)).unwrap_or(usize::MAX);
        Ok(events.iter().skip(skip).cloned().collect())
    }

    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        let Some(stream) = self.stream(aggregate_id)? else {
            return Ok(0);
        };
        let events = stream.lock().map_err(|_| poisoned())?;
        Ok(events.last().map_or(0, |event| event.sequence_number))
    }

    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            // Nothing to write, but a stale caller is still told so.
            let actual = self.current_version(aggregate_id).await?;
            if actual != expected_version {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id,
                    expected: expected_version,
                    actual,
                });
            }
            return Ok(());
        }
        let stream = self.stream_or_insert(aggregate_id)?;
        let mut stored = stream.lock().map_err(|_| poisoned())?;

        let actual = stored.last().map_or(0, |event| event.sequence_number);
        if actual != expected_version {
            tracing::debug!(expected_version, actual, "version mismatch, rejecting append");
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }
        // The whole batch is checked before the stream is touched, so a
        // rejected batch leaves no prefix behind.
        validate_batch(aggregate_id, expected_version, events)?;
        stored.extend_from_slice(events);
        tracing::debug!(
            version = stored.last().map_or(0, |event| event.sequence_number),
            "events appended"
        );
        Ok(())
    }
}

/// Snapshot store holding the latest snapshot per aggregate in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotStore {
    records: Arc<Mutex<HashMap<Uuid, SnapshotRecord>>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the snapshot of an aggregate, forcing the next load to replay
    /// its full history.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the store's lock is poisoned.
    pub fn evict(&self, aggregate_id: Uuid) -> Result<(), DomainError> {
        self.records
            .lock()
            .map_err(|_| poisoned())?
            .remove(&aggregate_id);
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save_snapshot(&self, record: &SnapshotRecord) -> Result<bool, DomainError> {
        let mut records = self.records.lock().map_err(|_| poisoned())?;
        if records
            .get(&record.aggregate_id)
            .is_some_and(|current| current.version >= record.version)
        {
            return Ok(false);
        }
        records.insert(record.aggregate_id, record.clone());
        Ok(true)
    }

    async fn load_latest_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Option<SnapshotRecord>, DomainError> {
        let records = self.records.lock().map_err(|_| poisoned())?;
        Ok(records.get(&aggregate_id).cloned())
    }
}
