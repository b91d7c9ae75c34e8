//! Event codec: explicit mapping between event type names and variants.
//!
//! Every aggregate module builds one [`EventCodec`] listing each event type
//! it can read back. Decoding an event whose type name was never
//! registered fails with `DomainError::UnknownEventType` instead of being
//! routed to a guessed variant.

use std::collections::BTreeMap;

use crate::error::DomainError;
use crate::event::{Event, EventKind, EventMetadata};
use crate::repository::StoredEvent;

/// Decodes one payload into its variant of `K`.
pub type DecodeFn<K> = fn(serde_json::Value) -> Result<K, serde_json::Error>;

/// Registry of the event types of one aggregate type.
#[derive(Debug, Clone)]
pub struct EventCodec<K> {
    aggregate_type: &'static str,
    decoders: BTreeMap<&'static str, DecodeFn<K>>,
}

impl<K: EventKind> EventCodec<K> {
    /// Creates an empty codec for `aggregate_type`.
    #[must_use]
    pub fn new(aggregate_type: &'static str) -> Self {
        Self {
            aggregate_type,
            decoders: BTreeMap::new(),
        }
    }

    /// Registers the decoder for `event_type`.
    ///
    /// # Panics
    ///
    /// Panics if `event_type` is already registered. Codecs are built once
    /// at startup, so a duplicate is a programming error.
    #[must_use]
    pub fn register(mut self, event_type: &'static str, decode: DecodeFn<K>) -> Self {
        let previous = self.decoders.insert(event_type, decode);
        assert!(
            previous.is_none(),
            "event type {event_type} registered twice for {}",
            self.aggregate_type
        );
        self
    }

    /// Returns the aggregate type this codec belongs to.
    #[must_use]
    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    /// Returns the registered event type names in sorted order.
    pub fn registered_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Whether `event_type` can be decoded.
    #[must_use]
    pub fn is_registered(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Converts an event into its storage envelope.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` if the variant's type name is
    /// not registered (it could never be read back) and `DomainError::Codec`
    /// if the payload cannot be serialized.
    pub fn encode(&self, event: &Event<K>) -> Result<StoredEvent, DomainError> {
        let event_type = event.kind.event_type();
        if !self.is_registered(event_type) {
            return Err(DomainError::UnknownEventType(event_type.to_owned()));
        }
        let payload = event.kind.to_payload().map_err(|e| {
            DomainError::Codec(format!("failed to encode {event_type} payload: {e}"))
        })?;
        let meta = &event.metadata;
        Ok(StoredEvent {
            event_id: meta.event_id,
            aggregate_id: meta.aggregate_id,
            aggregate_type: self.aggregate_type.to_owned(),
            event_type: event_type.to_owned(),
            payload,
            sequence_number: meta.sequence_number,
            correlation_id: meta.correlation_id,
            causation_id: meta.causation_id,
            occurred_at: meta.occurred_at,
        })
    }

    /// Reconstructs the typed event from its storage envelope.
    ///
    /// Fields missing from an old payload take their serde defaults and
    /// fields no longer known are ignored.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` if `stored.event_type` is not
    /// registered and `DomainError::Codec` if the envelope belongs to another
    /// aggregate type or its payload does not match the registered variant.
    pub fn decode(&self, stored: &StoredEvent) -> Result<Event<K>, DomainError> {
        let decode = self
            .decoders
            .get(stored.event_type.as_str())
            .ok_or_else(|| DomainError::UnknownEventType(stored.event_type.clone()))?;
        if stored.aggregate_type != self.aggregate_type {
            return Err(DomainError::Codec(format!(
                "event {} belongs to aggregate type {}, not {}",
                stored.event_id, stored.aggregate_type, self.aggregate_type
            )));
        }
        let kind = decode(stored.payload.clone()).map_err(|e| {
            DomainError::Codec(format!(
                "failed to decode {} payload of event {}: {e}",
                stored.event_type, stored.event_id
            ))
        })?;
        Ok(Event {
            metadata: EventMetadata {
                event_id: stored.event_id,
                aggregate_id: stored.aggregate_id,
                sequence_number: stored.sequence_number,
                correlation_id: stored.correlation_id,
                causation_id: stored.causation_id,
                occurred_at: stored.occurred_at,
            },
            kind,
        })
    }

    /// Decodes a whole stream, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first error [`EventCodec::decode`] reports.
    pub fn decode_all(&self, stored: &[StoredEvent]) -> Result<Vec<Event<K>>, DomainError> {
        stored.iter().map(|event| self.decode(event)).collect()
    }
}
