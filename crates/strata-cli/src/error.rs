//! CLI error type.

use strata_core::error::DomainError;
use strata_event_store::config::ConfigError;
use thiserror::Error;

/// Errors surfaced by the `strata` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration or connection error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A command or query was rejected or the store failed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Output could not be rendered.
    #[error("failed to render output: {0}")]
    Render(#[from] serde_json::Error),

    /// `--in-memory` was combined with a command that needs a person
    /// stored by an earlier run.
    #[error("`{0}` needs a persistent store; --in-memory keeps nothing between runs")]
    EphemeralStore(&'static str),

    /// Output could not be written.
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code: 2 for rejected commands and misuse, 3 for concurrency
    /// conflicts, 1 for everything else.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Domain(e)
                if e.is_rule_violation() || matches!(e, DomainError::AggregateNotFound(_)) =>
            {
                2
            }
            Self::EphemeralStore(_) => 2,
            Self::Domain(DomainError::ConcurrencyConflict { .. }) => 3,
            _ => 1,
        }
    }
}
