//! Hand-off point for events that have been durably persisted.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::repository::StoredEvent;

/// Delivers persisted events to subscribers.
///
/// The repository calls `publish` only after the events are committed to
/// the event store. Delivery guarantees (outbox polling, retries, at-least
/// once) belong to the implementation.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes a batch of events from one aggregate, in stream order.
    async fn publish(&self, events: &[StoredEvent]) -> Result<(), DomainError>;
}
