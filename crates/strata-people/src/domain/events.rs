//! Domain events for people.

use serde::{Deserialize, Serialize};
use strata_core::codec::EventCodec;
use strata_core::event::EventKind;

/// Aggregate type name stored with every person event and snapshot.
pub const PERSON_AGGREGATE_TYPE: &str = "person";

/// Event type for [`PersonCreated`].
pub const PERSON_CREATED_EVENT_TYPE: &str = "person.created";
/// Event type for [`PersonNameChanged`].
pub const PERSON_NAME_CHANGED_EVENT_TYPE: &str = "person.name_changed";
/// Event type for [`PersonNameReverted`].
pub const PERSON_NAME_REVERTED_EVENT_TYPE: &str = "person.name_reverted";
/// Event type for [`PersonFinalized`].
pub const PERSON_FINALIZED_EVENT_TYPE: &str = "person.finalized";

/// Emitted when a person is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonCreated {
    /// The initial name.
    pub name: String,
}

/// Emitted when a person takes a new name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonNameChanged {
    /// The new name.
    pub name: String,
    /// Why the name changed. Events written before this field existed
    /// decode with `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Emitted when the latest rename is undone. Compensates a
/// [`PersonNameChanged`] without touching it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonNameReverted {
    /// The name restored by the undo.
    pub name: String,
}

/// Emitted when a person's record is closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonFinalized {}

/// Event payload variants for people.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonEventKind {
    /// A person has been registered.
    Created(PersonCreated),
    /// A person has been renamed.
    NameChanged(PersonNameChanged),
    /// A rename has been undone.
    NameReverted(PersonNameReverted),
    /// A person has been finalized.
    Finalized(PersonFinalized),
}

impl PersonEventKind {
    /// One-line human readable summary, used by history views.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Created(e) => format!("created as {:?}", e.name),
            Self::NameChanged(e) => match &e.reason {
                Some(reason) => format!("renamed to {:?} ({reason})", e.name),
                None => format!("renamed to {:?}", e.name),
            },
            Self::NameReverted(e) => format!("name reverted to {:?}", e.name),
            Self::Finalized(_) => "finalized".to_owned(),
        }
    }
}

impl EventKind for PersonEventKind {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => PERSON_CREATED_EVENT_TYPE,
            Self::NameChanged(_) => PERSON_NAME_CHANGED_EVENT_TYPE,
            Self::NameReverted(_) => PERSON_NAME_REVERTED_EVENT_TYPE,
            Self::Finalized(_) => PERSON_FINALIZED_EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Created(e) => serde_json::to_value(e),
            Self::NameChanged(e) => serde_json::to_value(e),
            Self::NameReverted(e) => serde_json::to_value(e),
            Self::Finalized(e) => serde_json::to_value(e),
        }
    }
}

/// Builds the codec registry for every person event type.
#[must_use]
pub fn person_codec() -> EventCodec<PersonEventKind> {
    EventCodec::new(PERSON_AGGREGATE_TYPE)
        .register(PERSON_CREATED_EVENT_TYPE, |payload| {
            serde_json::from_value(payload).map(PersonEventKind::Created)
        })
        .register(PERSON_NAME_CHANGED_EVENT_TYPE, |payload| {
            serde_json::from_value(payload).map(PersonEventKind::NameChanged)
        })
        .register(PERSON_NAME_REVERTED_EVENT_TYPE, |payload| {
            serde_json::from_value(payload).map(PersonEventKind::NameReverted)
        })
        .register(PERSON_FINALIZED_EVENT_TYPE, |payload| {
            serde_json::from_value(payload).map(PersonEventKind::Finalized)
        })
}
