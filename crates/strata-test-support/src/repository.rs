//! Test repositories: mock `EventRepository` implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use strata_core::error::DomainError;
use strata_core::repository::{EventRepository, StoredEvent};
use uuid::Uuid;

/// An event repository that records every `append_events` call. Returns
/// the configured history from every load and always accepts appends
/// without adding them to that history.
#[derive(Debug, Default)]
pub struct RecordingEventRepository {
    history: Mutex<Vec<StoredEvent>>,
    appended: Mutex<Vec<(Uuid, i64, Vec<StoredEvent>)>>,
}

impl RecordingEventRepository {
    /// Creates a recording repository that will return `history` from
    /// every load.
    #[must_use]
    pub fn new(history: Vec<StoredEvent>) -> Self {
        Self {
            history: Mutex::new(history),
            appended: Mutex::new(Vec::new()),
        }
    }

    /// Returns all recorded appends as `(aggregate_id, expected_version,
    /// events)`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<(Uuid, i64, Vec<StoredEvent>)> {
        self.appended.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.history.lock().unwrap().clone())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        self.appended
            .lock()
            .unwrap()
            .push((aggregate_id, expected_version, events.to_vec()));
        Ok(())
    }
}

/// An event repository that always returns an empty history and silently
/// accepts appends. Useful for "aggregate not found" scenarios and
/// creation commands.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Ok(())
    }
}

/// An event repository that always returns an infrastructure error.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

/// An event repository that loses the race a fixed number of times.
///
/// The first `conflicts` appends are rejected with
/// `DomainError::ConcurrencyConflict`; later ones are stored. Loads return
/// whatever has been stored, so a caller that reloads and retries
/// eventually succeeds.
#[derive(Debug)]
pub struct ConflictingEventRepository {
    stored: Mutex<Vec<StoredEvent>>,
    remaining_conflicts: Mutex<usize>,
    attempts: Mutex<usize>,
}

impl ConflictingEventRepository {
    /// Creates a repository seeded with `history` that rejects the next
    /// `conflicts` appends.
    #[must_use]
    pub fn new(history: Vec<StoredEvent>, conflicts: usize) -> Self {
        Self {
            stored: Mutex::new(history),
            remaining_conflicts: Mutex::new(conflicts),
            attempts: Mutex::new(0),
        }
    }

    /// Number of `append_events` calls seen so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl EventRepository for ConflictingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.stored.lock().unwrap().clone())
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        *self.attempts.lock().unwrap() += 1;
        let mut remaining = self.remaining_conflicts.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: expected_version + 1,
            });
        }
        self.stored.lock().unwrap().extend_from_slice(events);
        Ok(())
    }
}
