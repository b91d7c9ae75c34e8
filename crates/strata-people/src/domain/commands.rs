//! Commands for people.

use strata_core::command::Command;
use uuid::Uuid;

/// Command to register a new person.
#[derive(Debug, Clone)]
pub struct RegisterPerson {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The person identifier, chosen by the caller.
    pub person_id: Uuid,
    /// The initial name.
    pub name: String,
}

/// Command to rename a person.
#[derive(Debug, Clone)]
pub struct RenamePerson {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The person identifier.
    pub person_id: Uuid,
    /// The new name.
    pub name: String,
    /// Optional reason recorded with the rename.
    pub reason: Option<String>,
}

/// Command to undo a person's latest rename.
#[derive(Debug, Clone)]
pub struct RevertPersonName {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The person identifier.
    pub person_id: Uuid,
}

/// Command to finalize a person.
#[derive(Debug, Clone)]
pub struct FinalizePerson {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The person identifier.
    pub person_id: Uuid,
}

impl Command for RegisterPerson {
    fn command_type(&self) -> &'static str {
        "person.register"
    }

    fn aggregate_id(&self) -> Uuid {
        self.person_id
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Command for RenamePerson {
    fn command_type(&self) -> &'static str {
        "person.rename"
    }

    fn aggregate_id(&self) -> Uuid {
        self.person_id
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Command for RevertPersonName {
    fn command_type(&self) -> &'static str {
        "person.revert_name"
    }

    fn aggregate_id(&self) -> Uuid {
        self.person_id
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

impl Command for FinalizePerson {
    fn command_type(&self) -> &'static str {
        "person.finalize"
    }

    fn aggregate_id(&self) -> Uuid {
        self.person_id
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
