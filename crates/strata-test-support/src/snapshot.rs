//! Test snapshot stores.

use async_trait::async_trait;
use strata_core::error::DomainError;
use strata_core::snapshot::{SnapshotRecord, SnapshotStore};
use uuid::Uuid;

/// A snapshot store that fails every call. Saves and loads through it must
/// still succeed when snapshots are only advisory for writes.
#[derive(Debug)]
pub struct FailingSnapshotStore;

#[async_trait]
impl SnapshotStore for FailingSnapshotStore {
    async fn save_snapshot(&self, _record: &SnapshotRecord) -> Result<bool, DomainError> {
        Err(DomainError::Infrastructure("snapshot table unavailable".into()))
    }

    async fn load_latest_snapshot(
        &self,
        _aggregate_id: Uuid,
    ) -> Result<Option<SnapshotRecord>, DomainError> {
        Err(DomainError::Infrastructure("snapshot table unavailable".into()))
    }
}
