//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate was not found.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// An event was applied to an aggregate it does not belong to.
    #[error("event for aggregate {actual} cannot be applied to aggregate {expected}")]
    AggregateMismatch {
        /// The aggregate the event was applied to.
        expected: Uuid,
        /// The aggregate named by the event.
        actual: Uuid,
    },

    /// An event was applied out of order.
    #[error("version conflict on aggregate {aggregate_id}: expected event version {expected}, got {actual}")]
    VersionConflict {
        /// The aggregate being applied to.
        aggregate_id: Uuid,
        /// The version the next event must carry.
        expected: i64,
        /// The version the event carried.
        actual: i64,
    },

    /// A batch handed to the event store is not contiguous.
    #[error("version gap on aggregate {aggregate_id}: expected event version {expected}, got {actual}")]
    VersionGap {
        /// The aggregate being appended to.
        aggregate_id: Uuid,
        /// The version the next event in the batch must carry.
        expected: i64,
        /// The version the event carried.
        actual: i64,
    },

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A business rule rejected the requested transition.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// A stored event carries a type name no codec registered.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// An event payload or snapshot could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Whether repeating the whole load/decide/save cycle may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::Infrastructure(_)
        )
    }

    /// Whether the error is a business rule rejection of the command.
    #[must_use]
    pub fn is_rule_violation(&self) -> bool {
        matches!(self, Self::InvalidStateTransition(_) | Self::Validation(_))
    }
}
