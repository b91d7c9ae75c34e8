//! Query handlers for people.
//!
//! Read-only views built by replaying the person's stream; nothing here
//! writes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strata_core::aggregate_repository::AggregateRepository;
use strata_core::error::DomainError;
use strata_core::repository::EventRepository;
use uuid::Uuid;

use crate::domain::aggregates::PersonState;

/// Read-only view of a person.
#[derive(Debug, Serialize)]
pub struct PersonView {
    /// The person identifier.
    pub person_id: Uuid,
    /// Current name.
    pub name: String,
    /// Whether the record is closed.
    pub finalized: bool,
    /// Names replaced by renames, oldest first.
    pub previous_names: Vec<String>,
    /// Number of renames.
    pub rename_count: u32,
    /// Current version (event count).
    pub version: i64,
}

/// One entry of a person's history.
#[derive(Debug, Serialize)]
pub struct PersonHistoryEntry {
    /// Version the event moved the person to.
    pub version: i64,
    /// Event type name, e.g. `person.name_changed`.
    pub event_type: String,
    /// Human readable summary.
    pub summary: String,
    /// Correlation ID of the command that raised the event.
    pub correlation_id: Uuid,
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,
}

/// Retrieves a person by id.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the id,
/// or the repository's error if loading or decoding fails.
pub async fn get_person_by_id(
    person_id: Uuid,
    repo: &AggregateRepository<PersonState>,
) -> Result<PersonView, DomainError> {
    let person = repo.load_existing(person_id).await?;
    let state = person.state();
    Ok(PersonView {
        person_id,
        name: state.name.clone(),
        finalized: state.finalized,
        previous_names: state.previous_names.clone(),
        rename_count: state.rename_count,
        version: person.version(),
    })
}

/// Retrieves a person's full event history in version order.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if no events exist for the id,
/// `DomainError::UnknownEventType` or `DomainError::Codec` if an event
/// cannot be decoded, or the store's error.
pub async fn get_person_history(
    person_id: Uuid,
    repo: &AggregateRepository<PersonState>,
) -> Result<Vec<PersonHistoryEntry>, DomainError> {
    let stored = repo.event_repository().load_events(person_id).await?;
    if stored.is_empty() {
        return Err(DomainError::AggregateNotFound(person_id));
    }
    let events = repo.codec().decode_all(&stored)?;
    Ok(events
        .into_iter()
        .map(|event| PersonHistoryEntry {
            version: event.sequence_number(),
            event_type: event.event_type().to_owned(),
            summary: event.kind.describe(),
            correlation_id: event.metadata.correlation_id,
            occurred_at: event.metadata.occurred_at,
        })
        .collect())
}
