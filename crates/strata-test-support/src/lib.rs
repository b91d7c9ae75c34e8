//! Shared test doubles for the Strata event store.

mod clock;
mod fixtures;
mod publisher;
mod repository;
mod snapshot;

pub use clock::{FixedClock, fixed_clock};
pub use fixtures::stored_event;
pub use publisher::{FailingPublisher, RecordingPublisher};
pub use repository::{
    ConflictingEventRepository, EmptyEventRepository, FailingEventRepository,
    RecordingEventRepository,
};
pub use snapshot::FailingSnapshotStore;
