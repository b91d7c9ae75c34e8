//! Snapshot abstractions.
//!
//! Snapshots cache an aggregate's state at a version so loading can skip
//! the events before it. They are advisory: any snapshot may be deleted
//! and rebuilt from the event log without changing what a load returns.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;

/// Materialized aggregate state at a given version.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    /// The aggregate the snapshot belongs to.
    pub aggregate_id: Uuid,
    /// Type of the aggregate, e.g. `"person"`.
    pub aggregate_type: String,
    /// Version of the last event folded into `state`.
    pub version: i64,
    /// Serialized aggregate state.
    pub state: serde_json::Value,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

/// Persistence for the latest snapshot of each aggregate.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Stores `record` unless a snapshot at the same or a later version is
    /// already stored. Returns whether the record was stored.
    async fn save_snapshot(&self, record: &SnapshotRecord) -> Result<bool, DomainError>;

    /// Returns the latest snapshot of an aggregate, if any.
    async fn load_latest_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<Option<SnapshotRecord>, DomainError>;
}

/// When the repository takes a snapshot after a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotPolicy {
    /// Never take snapshots; existing ones are still used when loading.
    #[default]
    Never,
    /// Take a snapshot once this many events have accumulated since the
    /// last one.
    EveryNEvents(u64),
}

impl SnapshotPolicy {
    /// Whether an aggregate at `version` whose last snapshot is at
    /// `snapshot_version` should be snapshotted.
    #[must_use]
    pub fn should_snapshot(self, version: i64, snapshot_version: i64) -> bool {
        match self {
            Self::Never | Self::EveryNEvents(0) => false,
            Self::EveryNEvents(threshold) => {
                u64::try_from(version - snapshot_version).is_ok_and(|since| since >= threshold)
            }
        }
    }
}

impl FromStr for SnapshotPolicy {
    type Err = DomainError;

    /// Parses `"never"`, `"0"` or a positive event count.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("never") {
            return Ok(Self::Never);
        }
        match s.parse::<u64>() {
            Ok(0) => Ok(Self::Never),
            Ok(n) => Ok(Self::EveryNEvents(n)),
            Err(e) => Err(DomainError::Validation(format!(
                "invalid snapshot policy {s:?}: {e}"
            ))),
        }
    }
}
