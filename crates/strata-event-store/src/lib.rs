//! Storage engines for the Strata event store.
//!
//! Provides `PostgreSQL` implementations of the event repository and
//! snapshot store traits defined in `strata-core`, in-memory equivalents
//! for tests and throwaway runs, the embedded schema migrations, and the
//! environment-driven store configuration.

pub mod config;
pub mod in_memory;
pub mod pg_event_repository;
pub mod pg_snapshot_store;
pub mod schema;

use strata_core::error::DomainError;

pub(crate) fn infrastructure_error(error: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("database error: {error}"))
}
