//! `PostgreSQL` implementation of the `SnapshotStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use strata_core::error::DomainError;
use strata_core::snapshot::{SnapshotRecord, SnapshotStore};

use crate::infrastructure_error;

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    aggregate_id: Uuid,
    aggregate_type: String,
    version: i64,
    state: serde_json::Value,
    taken_at: DateTime<Utc>,
}

/// PostgreSQL-backed snapshot store keeping the latest snapshot per
/// aggregate in the `snapshots` table.
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    /// Creates a new `PgSnapshotStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    #[tracing::instrument(
        skip(self, record),
        fields(aggregate_id = %record.aggregate_id, version = record.version)
    )]
    async fn save_snapshot(&self, record: &SnapshotRecord) -> Result<bool, DomainError> {
        // The WHERE clause keeps an older snapshot from replacing a newer
        // one when two writers race.
        let result = sqlx::query(
            r"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, state, taken_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id) DO UPDATE
            SET aggregate_type = EXCLUDED.aggregate_type,
                version = EXCLUDED.version,
                state = EXCLUDED.state,
                taken_at = EXCLUDED.taken_at
            WHERE snapshots.version < EXCLUDED.version
            ",
        )
        .bind(record.aggregate_id)
        .bind(&record.aggregate_type)
        .bind(record.version)
        .bind(record.state.clone())
        .bind(record.taken_at)
        .execute(&self.pool)
        .await
        .map_err(infrastructure_error)?;

        let stored = result.rows_affected() > 0;
        tracing::trace!(stored, "snapshot upsert evaluated");
        Ok(stored)
    }

    #[tracing::instrument(skip(self))]
    async fn load_latest_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Option<SnapshotRecord>, DomainError> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r"
            SELECT aggregate_id, aggregate_type, version, state, taken_at
            FROM snapshots
            WHERE aggregate_id = $1
            ",
        )
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(infrastructure_error)?;

        tracing::trace!(found = row.is_some(), "snapshot lookup");
        Ok(row.map(|row| SnapshotRecord {
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            version: row.version,
            state: row.state,
            taken_at: row.taken_at,
        }))
    }
}
