//! End-to-end tests of `AggregateRepository` over the storage engines.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use strata_core::aggregate::{Aggregate, AggregateState, ApplyMode};
use strata_core::aggregate_repository::AggregateRepository;
use strata_core::codec::EventCodec;
use strata_core::error::DomainError;
use strata_core::event::{Event, EventKind};
use strata_core::repository::EventRepository;
use strata_core::snapshot::{SnapshotPolicy, SnapshotStore};
use strata_event_store::in_memory::{InMemoryEventRepository, InMemorySnapshotStore};
use strata_event_store::pg_event_repository::PgEventRepository;
use strata_event_store::pg_snapshot_store::PgSnapshotStore;
use strata_test_support::{FailingPublisher, FailingSnapshotStore, RecordingPublisher, fixed_clock};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Opened {
    title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Commented {
    body: String,
}

#[derive(Debug, Clone, PartialEq)]
enum TicketEventKind {
    Opened(Opened),
    Commented(Commented),
}

impl EventKind for TicketEventKind {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Opened(_) => "ticket.opened",
            Self::Commented(_) => "ticket.commented",
        }
    }

    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Opened(e) => serde_json::to_value(e),
            Self::Commented(e) => serde_json::to_value(e),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Ticket {
    title: String,
    comments: Vec<String>,
}

impl AggregateState for Ticket {
    type Event = TicketEventKind;

    const AGGREGATE_TYPE: &'static str = "ticket";

    fn codec() -> EventCodec<Self::Event> {
        EventCodec::new(Self::AGGREGATE_TYPE)
            .register("ticket.opened", |v| {
                serde_json::from_value(v).map(TicketEventKind::Opened)
            })
            .register("ticket.commented", |v| {
                serde_json::from_value(v).map(TicketEventKind::Commented)
            })
    }

    fn apply(&mut self, event: &Event<Self::Event>, _mode: ApplyMode) {
        match &event.kind {
            TicketEventKind::Opened(e) => self.title.clone_from(&e.title),
            TicketEventKind::Commented(e) => self.comments.push(e.body.clone()),
        }
    }
}

fn open(ticket: &mut Aggregate<Ticket>, title: &str) {
    ticket
        .raise(
            TicketEventKind::Opened(Opened {
                title: title.to_owned(),
            }),
            Uuid::new_v4(),
            &fixed_clock(),
        )
        .unwrap();
}

fn comment(ticket: &mut Aggregate<Ticket>, body: &str) {
    ticket
        .raise(
            TicketEventKind::Commented(Commented {
                body: body.to_owned(),
            }),
            Uuid::new_v4(),
            &fixed_clock(),
        )
        .unwrap();
}

// --- PostgreSQL ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_pg_save_then_load_round_trips_state(pool: PgPool) {
    // Arrange
    let repo = AggregateRepository::<Ticket>::new(
        Arc::new(PgEventRepository::new(pool)),
        Arc::new(fixed_clock()),
    );
    let id = Uuid::new_v4();
    let mut ticket = repo.load(id).await.unwrap();
    assert_eq!(ticket.version(), 0);
    open(&mut ticket, "printer on fire");
    comment(&mut ticket, "have you tried turning it off");

    // Act
    let stored = repo.save(&mut ticket).await.unwrap();
    let loaded = repo.load(id).await.unwrap();

    // Assert
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|e| e.aggregate_type == "ticket"));
    assert_eq!(loaded.version(), 2);
    assert_eq!(loaded.state(), ticket.state());
    assert!(loaded.pending_events().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_pg_snapshot_seeded_load_matches_full_replay(pool: PgPool) {
    // Arrange
    let events = Arc::new(PgEventRepository::new(pool.clone()));
    let snapshots = Arc::new(PgSnapshotStore::new(pool));
    let with_snapshots = AggregateRepository::<Ticket>::new(events.clone(), Arc::new(fixed_clock()))
        .with_snapshots(snapshots.clone(), SnapshotPolicy::EveryNEvents(3));
    let replay_only = AggregateRepository::<Ticket>::new(events, Arc::new(fixed_clock()));
    let id = Uuid::new_v4();

    let mut ticket = with_snapshots.load(id).await.unwrap();
    open(&mut ticket, "slow builds");
    for body in ["a", "b"] {
        comment(&mut ticket, body);
        with_snapshots.save(&mut ticket).await.unwrap();
    }
    comment(&mut ticket, "c");
    with_snapshots.save(&mut ticket).await.unwrap();

    // Act
    let seeded = with_snapshots.load(id).await.unwrap();
    let replayed = replay_only.load(id).await.unwrap();

    // Assert
    let snapshot = snapshots.load_latest_snapshot(id).await.unwrap().unwrap();
    assert_eq!(snapshot.version, 3);
    assert_eq!(seeded.snapshot_version(), 3);
    assert_eq!(seeded.version(), 4);
    assert_eq!(seeded.state(), replayed.state());
    assert_eq!(seeded.state().comments, vec!["a", "b", "c"]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_pg_stale_aggregate_save_conflicts_and_storage_is_unchanged(pool: PgPool) {
    // Arrange
    let events = Arc::new(PgEventRepository::new(pool));
    let repo = AggregateRepository::<Ticket>::new(events.clone(), Arc::new(fixed_clock()));
    let id = Uuid::new_v4();
    let mut ticket = repo.load(id).await.unwrap();
    open(&mut ticket, "flaky test");
    comment(&mut ticket, "one");
    repo.save(&mut ticket).await.unwrap();

    let mut stale = repo.load(id).await.unwrap();
    comment(&mut ticket, "two");
    repo.save(&mut ticket).await.unwrap();

    // Act
    comment(&mut stale, "late");
    let result = repo.save(&mut stale).await;

    // Assert
    assert!(matches!(
        result,
        Err(DomainError::ConcurrencyConflict {
            expected: 2,
            actual: 3,
            ..
        })
    ));
    assert_eq!(events.current_version(id).await.unwrap(), 3);
    assert_eq!(repo.load(id).await.unwrap().state().comments, vec!["one", "two"]);
}

// --- in-memory ---

#[tokio::test]
async fn test_saved_batch_is_published_in_order() {
    // Arrange
    let publisher = Arc::new(RecordingPublisher::new());
    let repo = AggregateRepository::<Ticket>::new(
        Arc::new(InMemoryEventRepository::new()),
        Arc::new(fixed_clock()),
    )
    .with_publisher(publisher.clone());
    let mut ticket = repo.load(Uuid::new_v4()).await.unwrap();
    open(&mut ticket, "docs typo");
    comment(&mut ticket, "fixed");

    // Act
    let stored = repo.save(&mut ticket).await.unwrap();

    // Assert
    assert_eq!(publisher.published(), vec![stored]);
}

#[tokio::test]
async fn test_publisher_failure_does_not_undo_the_save() {
    let events = Arc::new(InMemoryEventRepository::new());
    let repo = AggregateRepository::<Ticket>::new(events.clone(), Arc::new(fixed_clock()))
        .with_publisher(Arc::new(FailingPublisher));
    let id = Uuid::new_v4();
    let mut ticket = repo.load(id).await.unwrap();
    open(&mut ticket, "pager noise");

    let stored = repo.save(&mut ticket).await.unwrap();

    assert_eq!(stored.len(), 1);
    assert_eq!(events.current_version(id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_unavailable_snapshot_store_falls_back_to_replay() {
    // Arrange
    let events = Arc::new(InMemoryEventRepository::new());
    let repo = AggregateRepository::<Ticket>::new(events.clone(), Arc::new(fixed_clock()))
        .with_snapshots(Arc::new(FailingSnapshotStore), SnapshotPolicy::EveryNEvents(1));
    let id = Uuid::new_v4();
    let mut ticket = repo.load(id).await.unwrap();
    open(&mut ticket, "disk full");

    // Act
    repo.save(&mut ticket).await.unwrap();
    let loaded = repo.load(id).await.unwrap();

    // Assert
    assert_eq!(loaded.version(), 1);
    assert_eq!(loaded.snapshot_version(), 0);
    assert_eq!(loaded.state().title, "disk full");
}

#[tokio::test]
async fn test_evicted_snapshot_rebuilds_identical_state() {
    // Arrange
    let events = Arc::new(InMemoryEventRepository::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repo = AggregateRepository::<Ticket>::new(events, Arc::new(fixed_clock()))
        .with_snapshots(snapshots.clone(), SnapshotPolicy::EveryNEvents(1));
    let id = Uuid::new_v4();
    let mut ticket = repo.load(id).await.unwrap();
    open(&mut ticket, "cache");
    comment(&mut ticket, "warm");
    repo.save(&mut ticket).await.unwrap();
    let seeded = repo.load(id).await.unwrap();

    // Act
    snapshots.evict(id).unwrap();
    let rebuilt = repo.load(id).await.unwrap();

    // Assert
    assert_eq!(seeded.snapshot_version(), 2);
    assert_eq!(rebuilt.snapshot_version(), 0);
    assert_eq!(rebuilt.state(), seeded.state());
    assert_eq!(rebuilt.version(), seeded.version());
}
