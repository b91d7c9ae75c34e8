//! Event repository abstraction.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DomainError;

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Type of the owning aggregate, e.g. `"person"`.
    pub aggregate_type: String,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Sequence number within the aggregate stream.
    pub sequence_number: i64,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

/// Repository trait for loading and appending domain events.
///
/// Implementations own the event log: nothing else may mutate a stream
/// except through [`EventRepository::append_events`].
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Load all events for a given aggregate, ordered by sequence number.
    ///
    /// An unknown aggregate yields an empty list, not an error.
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError>;

    /// Load the events of an aggregate with a sequence number greater than
    /// `after_version`, ordered by sequence number.
    async fn load_events_after(
        &self,
        aggregate_id: Uuid,
        after_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let mut events = self.load_events(aggregate_id).await?;
        events.retain(|event| event.sequence_number > after_version);
        Ok(events)
    }

    /// Returns the stored version of an aggregate, 0 if it has no events.
    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        let events = self.load_events(aggregate_id).await?;
        Ok(events.last().map_or(0, |event| event.sequence_number))
    }

    /// Append new events to an aggregate stream with optimistic concurrency.
    /// `expected_version` is the last known sequence number.
    ///
    /// The batch is persisted entirely or not at all.
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError>;
}

/// Checks that `events` belong to `aggregate_id` and continue the stream
/// at `expected_version + 1` without gaps.
///
/// # Errors
///
/// Returns `DomainError::AggregateMismatch` for an event of another
/// aggregate and `DomainError::VersionGap` for the first event whose
/// sequence number breaks the run.
pub fn validate_batch(
    aggregate_id: Uuid,
    expected_version: i64,
    events: &[StoredEvent],
) -> Result<(), DomainError> {
    let mut next = expected_version + 1;
    for event in events {
        if event.aggregate_id != aggregate_id {
            return Err(DomainError::AggregateMismatch {
                expected: aggregate_id,
                actual: event.aggregate_id,
            });
        }
        if event.sequence_number != next {
            return Err(DomainError::VersionGap {
                aggregate_id,
                expected: next,
                actual: event.sequence_number,
            });
        }
        next += 1;
    }
    Ok(())
}
