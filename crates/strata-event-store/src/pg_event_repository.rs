//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use strata_core::error::DomainError;
use strata_core::repository::{EventRepository, StoredEvent, validate_batch};

use crate::infrastructure_error;

const SELECT_EVENTS: &str = r"
SELECT event_id, aggregate_id, aggregate_type, event_type, payload,
       sequence_number, correlation_id, causation_id, occurred_at
FROM domain_events
";

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    event_id: Uuid,
    aggregate_id: Uuid,
    aggregate_type: String,
    event_type: String,
    payload: serde_json::Value,
    sequence_number: i64,
    correlation_id: Uuid,
    causation_id: Uuid,
    occurred_at: DateTime<Utc>,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.event_id,
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            event_type: row.event_type,
            payload: row.payload,
            sequence_number: row.sequence_number,
            correlation_id: row.correlation_id,
            causation_id: row.causation_id,
            occurred_at: row.occurred_at,
        }
    }
}

/// PostgreSQL-backed event repository.
///
/// Each append runs in one transaction: the aggregate's summary row is
/// locked, its version compared with the caller's, the batch inserted and
/// the version advanced. If the transaction is dropped before commit
/// (error or cancellation) nothing of the batch is visible.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    #[tracing::instrument(skip(self))]
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "{SELECT_EVENTS} WHERE aggregate_id = $1 ORDER BY sequence_number"
        ))
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure_error)?;
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn load_events_after(
        &self,
        aggregate_id: Uuid,
        after_version: i64,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "{SELECT_EVENTS} WHERE aggregate_id = $1 AND sequence_number > $2 ORDER BY sequence_number"
        ))
        .bind(aggregate_id)
        .bind(after_version)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure_error)?;
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT current_version FROM aggregates WHERE aggregate_id = $1")
                .bind(aggregate_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(infrastructure_error)?;
        Ok(version.unwrap_or(0))
    }

    #[tracing::instrument(skip(self, events), fields(event_count = events.len()))]
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let Some(last) = events.last() else {
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
        };
        let aggregate_type = &events[0].aggregate_type;

        let mut tx = self.pool.begin().await.map_err(infrastructure_error)?;

        sqlx::query(
            r"
            INSERT INTO aggregates (aggregate_id, aggregate_type, current_version)
            VALUES ($1, $2, 0)
            ON CONFLICT (aggregate_id) DO NOTHING
            ",
        )
        .bind(aggregate_id)
        .bind(aggregate_type)
        .execute(&mut *tx)
        .await
        .map_err(infrastructure_error)?;

        let actual: i64 = sqlx::query_scalar(
            "SELECT current_version FROM aggregates WHERE aggregate_id = $1 FOR UPDATE",
        )
        .bind(aggregate_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(infrastructure_error)?;

        if actual != expected_version {
            tracing::debug!(expected_version, actual, "version mismatch, rejecting append");
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }
        validate_batch(aggregate_id, expected_version, events)?;

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO domain_events (event_id, aggregate_id, aggregate_type, event_type, \
             payload, sequence_number, correlation_id, causation_id, occurred_at) ",
        );
        qb.push_values(events, |mut b, event| {
            b.push_bind(event.event_id)
                .push_bind(event.aggregate_id)
                .push_bind(event.aggregate_type.clone())
                .push_bind(event.event_type.clone())
                .push_bind(event.payload.clone())
                .push_bind(event.sequence_number)
                .push_bind(event.correlation_id)
                .push_bind(event.causation_id)
                .push_bind(event.occurred_at);
        });
        if let Err(e) = qb.build().execute(&mut *tx).await {
            drop(tx);
            return Err(self.insert_error(e, aggregate_id, expected_version).await);
        }

        sqlx::query("UPDATE aggregates SET current_version = $1 WHERE aggregate_id = $2")
            .bind(last.sequence_number)
            .bind(aggregate_id)
            .execute(&mut *tx)
            .await
            .map_err(infrastructure_error)?;

        tx.commit().await.map_err(infrastructure_error)?;
        tracing::debug!(version = last.sequence_number, "events appended");
        Ok(())
    }
}

impl PgEventRepository {
    /// Maps a failed batch insert. A duplicate `(aggregate_id,
    /// sequence_number)` means another writer got there first.
    async fn insert_error(
        &self,
        error: sqlx::Error,
        aggregate_id: Uuid,
        expected_version: i64,
    ) -> DomainError {
        let duplicate = matches!(&error, sqlx::Error::Database(db) if db.is_unique_violation());
        if !duplicate {
            return infrastructure_error(error);
        }
        let actual = self
            .current_version(aggregate_id)
            .await
            .unwrap_or(expected_version);
        DomainError::ConcurrencyConflict {
            aggregate_id,
            expected: expected_version,
            actual,
        }
    }
}
