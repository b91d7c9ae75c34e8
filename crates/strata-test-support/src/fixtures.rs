use serde_json::Value;
use strata_core::repository::StoredEvent;
use uuid::Uuid;

use crate::clock::fixed_clock;
use strata_core::clock::Clock;

/// Builds a stored envelope with fresh ids and the fixed test timestamp.
#[must_use]
pub fn stored_event(
    aggregate_id: Uuid,
    sequence_number: i64,
    event_type: &str,
    payload: Value,
) -> StoredEvent {
    let correlation_id = Uuid::new_v4();
    StoredEvent {
        event_id: Uuid::now_v7(),
        aggregate_id,
        aggregate_type: "test".to_owned(),
        event_type: event_type.to_owned(),
        payload,
        sequence_number,
        correlation_id,
        causation_id: correlation_id,
        occurred_at: fixed_clock().now(),
    }
}
