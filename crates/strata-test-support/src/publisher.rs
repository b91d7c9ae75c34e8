//! Test publishers.

use std::sync::Mutex;

use async_trait::async_trait;
use strata_core::error::DomainError;
use strata_core::publisher::EventPublisher;
use strata_core::repository::StoredEvent;

/// A publisher that records every batch it is handed.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Vec<StoredEvent>>>,
}

impl RecordingPublisher {
    /// Creates a publisher with nothing recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the published batches in call order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<Vec<StoredEvent>> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, events: &[StoredEvent]) -> Result<(), DomainError> {
        self.published.lock().unwrap().push(events.to_vec());
        Ok(())
    }
}

/// A publisher whose broker is always down.
#[derive(Debug)]
pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _events: &[StoredEvent]) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("broker unavailable".into()))
    }
}
