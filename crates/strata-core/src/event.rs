//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: Uuid,
    /// Monotonically increasing version within the aggregate stream.
    pub sequence_number: i64,
    /// Correlation ID for tracing a command through its effects.
    pub correlation_id: Uuid,
    /// Causation ID linking this event to the event/command that caused it.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

/// The closed set of event variants an aggregate produces and consumes.
///
/// Implemented by one enum per aggregate. Each variant wraps a payload
/// struct; only that struct is written to storage, the variant itself is
/// identified by [`EventKind::event_type`].
pub trait EventKind: Clone + Send + Sync + std::fmt::Debug {
    /// Returns the event type name (used for serialization routing).
    fn event_type(&self) -> &'static str;

    /// Serializes the variant's payload struct to JSON.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the payload cannot be represented
    /// as JSON.
    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error>;
}

/// A domain event: common metadata plus one variant of `K`.
#[derive(Debug, Clone)]
pub struct Event<K> {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: K,
}

impl<K: EventKind> Event<K> {
    /// Returns the event type name of the wrapped variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Returns the aggregate this event belongs to.
    #[must_use]
    pub fn aggregate_id(&self) -> Uuid {
        self.metadata.aggregate_id
    }

    /// Returns the version this event moves its aggregate to.
    #[must_use]
    pub fn sequence_number(&self) -> i64 {
        self.metadata.sequence_number
    }
}
