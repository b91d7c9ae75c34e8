//! Command handlers for people.
//!
//! Each handler runs load → decide → save against the aggregate
//! repository. When the save loses an optimistic concurrency race the
//! whole cycle is repeated on fresh state, up to the retry policy's limit;
//! every other error is returned as is.

use strata_core::aggregate::Aggregate;
use strata_core::aggregate_repository::AggregateRepository;
use strata_core::clock::Clock;
use strata_core::command::Command;
use strata_core::error::DomainError;
use strata_core::repository::StoredEvent;
use uuid::Uuid;

use crate::domain::aggregates::{PersonBehaviour, PersonState};
use crate::domain::commands::{FinalizePerson, RegisterPerson, RenamePerson, RevertPersonName};

/// How often a command is attempted when it keeps losing concurrency
/// races.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first included. Values below 1 act as 1.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self { max_attempts: 1 }
    }
}

/// Result of a successfully handled command.
#[derive(Debug)]
pub struct PersonCommandResult {
    /// The aggregate ID affected by the command.
    pub aggregate_id: Uuid,
    /// The aggregate version after the command.
    pub version: i64,
    /// The stored events produced and persisted.
    pub stored_events: Vec<StoredEvent>,
}

async fn execute<C, F>(
    command: &C,
    repo: &AggregateRepository<PersonState>,
    retry: RetryPolicy,
    must_exist: bool,
    decide: F,
) -> Result<PersonCommandResult, DomainError>
where
    C: Command,
    F: Fn(&mut Aggregate<PersonState>) -> Result<(), DomainError>,
{
    let aggregate_id = command.aggregate_id();
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let mut person = if must_exist {
            repo.load_existing(aggregate_id).await?
        } else {
            repo.load(aggregate_id).await?
        };
        decide(&mut person)?;

        match repo.save(&mut person).await {
            Ok(stored_events) => {
                return Ok(PersonCommandResult {
                    aggregate_id,
                    version: person.version(),
                    stored_events,
                });
            }
            Err(DomainError::ConcurrencyConflict { expected, actual, .. })
                if attempt < max_attempts =>
            {
                tracing::warn!(
                    attempt,
                    expected,
                    actual,
                    "concurrency conflict, retrying command"
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Handles the `RegisterPerson` command: creates the person and persists
/// the `person.created` event.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a blank name,
/// `DomainError::InvalidStateTransition` if the id is already taken, or
/// the store's error if loading or appending fails.
#[tracing::instrument(
    skip_all,
    fields(command_type = command.command_type(), person_id = %command.person_id)
)]
pub async fn handle_register_person(
    command: &RegisterPerson,
    clock: &dyn Clock,
    repo: &AggregateRepository<PersonState>,
    retry: RetryPolicy,
) -> Result<PersonCommandResult, DomainError> {
    execute(command, repo, retry, false, |person| {
        person.create(&command.name, command.correlation_id, clock)
    })
    .await
}

/// Handles the `RenamePerson` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the person does not exist,
/// `DomainError::InvalidStateTransition` if the person is finalized,
/// `DomainError::Validation` for a blank name, or the store's error.
#[tracing::instrument(
    skip_all,
    fields(command_type = command.command_type(), person_id = %command.person_id)
)]
pub async fn handle_rename_person(
    command: &RenamePerson,
    clock: &dyn Clock,
    repo: &AggregateRepository<PersonState>,
    retry: RetryPolicy,
) -> Result<PersonCommandResult, DomainError> {
    execute(command, repo, retry, true, |person| {
        person.rename(
            &command.name,
            command.reason.clone(),
            command.correlation_id,
            clock,
        )
    })
    .await
}

/// Handles the `RevertPersonName` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the person does not exist,
/// `DomainError::InvalidStateTransition` if there is nothing to revert, or
/// the store's error.
#[tracing::instrument(
    skip_all,
    fields(command_type = command.command_type(), person_id = %command.person_id)
)]
pub async fn handle_revert_person_name(
    command: &RevertPersonName,
    clock: &dyn Clock,
    repo: &AggregateRepository<PersonState>,
    retry: RetryPolicy,
) -> Result<PersonCommandResult, DomainError> {
    execute(command, repo, retry, true, |person| {
        person.revert_name(command.correlation_id, clock)
    })
    .await
}

/// Handles the `FinalizePerson` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the person does not exist,
/// `DomainError::InvalidStateTransition` if already finalized, or the
/// store's error.
#[tracing::instrument(
    skip_all,
    fields(command_type = command.command_type(), person_id = %command.person_id)
)]
pub async fn handle_finalize_person(
    command: &FinalizePerson,
    clock: &dyn Clock,
    repo: &AggregateRepository<PersonState>,
    retry: RetryPolicy,
) -> Result<PersonCommandResult, DomainError> {
    execute(command, repo, retry, true, |person| {
        person.finalize(command.correlation_id, clock)
    })
    .await
}
