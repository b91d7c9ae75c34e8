//! Command line definition and dispatch.

use std::io::Write;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use strata_core::aggregate_repository::AggregateRepository;
use strata_core::clock::{Clock, SystemClock};
use strata_event_store::config::StoreConfig;
use strata_event_store::in_memory::{InMemoryEventRepository, InMemorySnapshotStore};
use strata_event_store::pg_event_repository::PgEventRepository;
use strata_event_store::pg_snapshot_store::PgSnapshotStore;
use strata_event_store::schema;
use strata_people::application::command_handlers::{
    PersonCommandResult, RetryPolicy, handle_finalize_person, handle_register_person,
    handle_rename_person, handle_revert_person_name,
};
use strata_people::application::query_handlers::{get_person_by_id, get_person_history};
use strata_people::domain::aggregates::PersonState;
use strata_people::domain::commands::{
    FinalizePerson, RegisterPerson, RenamePerson, RevertPersonName,
};
use uuid::Uuid;

use crate::error::CliError;

#[derive(Debug, Parser)]
#[command(name = "strata")]
#[command(about = "Event-sourced people store")]
#[command(version)]
pub struct Cli {
    /// Keep everything in process memory instead of PostgreSQL. The store
    /// lasts for this run only, so commands that name an existing person
    /// are refused
    #[arg(long, global = true)]
    pub in_memory: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "STRATA_LOG_JSON")]
    pub log_json: bool,

    /// Attempts per command when it loses a concurrency race
    #[arg(long, global = true, env = "STRATA_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Register a new person
    Register {
        /// Initial name
        name: String,
        /// Person id; generated when omitted
        #[arg(long)]
        id: Option<Uuid>,
    },
    /// Rename a person
    Rename {
        /// Person id
        id: Uuid,
        /// New name
        name: String,
        /// Why the name changed
        #[arg(short = 'r', long = "reason")]
        reason: Option<String>,
    },
    /// Undo a person's latest rename
    Revert {
        /// Person id
        id: Uuid,
    },
    /// Close a person's record
    Finalize {
        /// Person id
        id: Uuid,
    },
    /// Show a person's current state
    Show {
        /// Person id
        id: Uuid,
    },
    /// List a person's events
    History {
        /// Person id
        id: Uuid,
    },
    /// Register "john", rename to "john doe" and print the history
    Demo,
}

impl Commands {
    /// Name of a command that needs a person stored by an earlier run.
    fn needs_existing_person(&self) -> Option<&'static str> {
        match self {
            Self::Rename { .. } => Some("rename"),
            Self::Revert { .. } => Some("revert"),
            Self::Finalize { .. } => Some("finalize"),
            Self::Show { .. } => Some("show"),
            Self::History { .. } => Some("history"),
            Self::Migrate | Self::Register { .. } | Self::Demo => None,
        }
    }
}

async fn open_repository(
    cli: &Cli,
    config: &StoreConfig,
    clock: Arc<dyn Clock>,
) -> Result<AggregateRepository<PersonState>, CliError> {
    if cli.in_memory {
        tracing::info!("using in-memory store");
        return Ok(
            AggregateRepository::new(Arc::new(InMemoryEventRepository::new()), clock)
                .with_snapshots(
                    Arc::new(InMemorySnapshotStore::new()),
                    config.snapshot_policy,
                ),
        );
    }
    let pool = config.connect().await?;
    Ok(
        AggregateRepository::new(Arc::new(PgEventRepository::new(pool.clone())), clock)
            .with_snapshots(Arc::new(PgSnapshotStore::new(pool)), config.snapshot_policy),
    )
}

fn command_summary(result: &PersonCommandResult) -> serde_json::Value {
    serde_json::json!({
        "person_id": result.aggregate_id,
        "version": result.version,
        "events": result
            .stored_events
            .iter()
            .map(|e| e.event_type.as_str())
            .collect::<Vec<_>>(),
    })
}

fn print_json<W: Write>(out: &mut W, value: &impl serde::Serialize) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Executes `cli` against the configured store, writing results to `out`.
///
/// # Errors
///
/// Returns `CliError` if configuration is invalid, the store is
/// unreachable, or the command is rejected.
pub async fn run<W: Write>(cli: Cli, config: &StoreConfig, out: &mut W) -> Result<(), CliError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let retry = RetryPolicy {
        max_attempts: cli.max_attempts,
    };

    if let Commands::Migrate = cli.command {
        if cli.in_memory {
            writeln!(out, "in-memory store needs no migrations")?;
            return Ok(());
        }
        let pool = config.connect().await?;
        schema::migrate(&pool).await?;
        writeln!(out, "migrations applied")?;
        return Ok(());
    }

    if let Some(command) = cli.command.needs_existing_person().filter(|_| cli.in_memory) {
        return Err(CliError::EphemeralStore(command));
    }

    let repo = open_repository(&cli, config, Arc::clone(&clock)).await?;
    let correlation_id = Uuid::now_v7();

    match cli.command {
        Commands::Migrate => {}
        Commands::Register { name, id } => {
            let command = RegisterPerson {
                correlation_id,
                person_id: id.unwrap_or_else(Uuid::now_v7),
                name,
            };
            let result = handle_register_person(&command, clock.as_ref(), &repo, retry).await?;
            print_json(out, &command_summary(&result))?;
        }
        Commands::Rename { id, name, reason } => {
            let command = RenamePerson {
                correlation_id,
                person_id: id,
                name,
                reason,
            };
            let result = handle_rename_person(&command, clock.as_ref(), &repo, retry).await?;
            print_json(out, &command_summary(&result))?;
        }
        Commands::Revert { id } => {
            let command = RevertPersonName {
                correlation_id,
                person_id: id,
            };
            let result = handle_revert_person_name(&command, clock.as_ref(), &repo, retry).await?;
            print_json(out, &command_summary(&result))?;
        }
        Commands::Finalize { id } => {
            let command = FinalizePerson {
                correlation_id,
                person_id: id,
            };
            let result = handle_finalize_person(&command, clock.as_ref(), &repo, retry).await?;
            print_json(out, &command_summary(&result))?;
        }
        Commands::Show { id } => {
            let view = get_person_by_id(id, &repo).await?;
            print_json(out, &view)?;
        }
        Commands::History { id } => {
            let history = get_person_history(id, &repo).await?;
            print_json(out, &history)?;
        }
        Commands::Demo => {
            let person_id = Uuid::now_v7();
            handle_register_person(
                &RegisterPerson {
                    correlation_id,
                    person_id,
                    name: "john".to_owned(),
                },
                clock.as_ref(),
                &repo,
                retry,
            )
            .await?;
            handle_rename_person(
                &RenamePerson {
                    correlation_id,
                    person_id,
                    name: "john doe".to_owned(),
                    reason: None,
                },
                clock.as_ref(),
                &repo,
                retry,
            )
            .await?;
            print_json(out, &get_person_by_id(person_id, &repo).await?)?;
            print_json(out, &get_person_history(person_id, &repo).await?)?;
        }
    }
    Ok(())
}
