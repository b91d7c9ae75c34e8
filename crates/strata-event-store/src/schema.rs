//! Event store database schema.
//!
//! The SQL lives in the workspace `migrations/` directory:
//!
//! - `aggregates`: one summary row per aggregate holding its type and
//!   current version. Appends lock this row, which serializes writers of
//!   the same aggregate without blocking writers of other aggregates.
//! - `domain_events`: the append-only log, unique on
//!   `(aggregate_id, sequence_number)`.
//! - `snapshots`: the latest snapshot per aggregate.

use sqlx::PgPool;
use sqlx::migrate::Migrator;

use strata_core::error::DomainError;

/// Embedded migrations for the event store tables.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Applies any pending migrations.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if a migration fails.
#[tracing::instrument(skip(pool))]
pub async fn migrate(pool: &PgPool) -> Result<(), DomainError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| DomainError::Infrastructure(format!("migration failed: {e}")))?;
    tracing::info!("event store schema is up to date");
    Ok(())
}
