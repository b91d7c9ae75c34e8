//! Store configuration read from the environment.

use std::str::FromStr;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use strata_core::snapshot::SnapshotPolicy;

/// Default size of the connection pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Errors raised while reading configuration or connecting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set to a value that could not be parsed.
    #[error("{name} is invalid: {reason}")]
    Invalid {
        /// The variable name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// `DATABASE_URL` was required but not set.
    #[error("DATABASE_URL environment variable must be set")]
    MissingDatabaseUrl,

    /// The pool could not connect.
    #[error("database connection failed: {0}")]
    Connect(#[from] sqlx::Error),
}

/// Connection and snapshot settings.
///
/// | Variable                 | Default |
/// |--------------------------|---------|
/// | `DATABASE_URL`           | unset   |
/// | `STRATA_MAX_CONNECTIONS` | `10`    |
/// | `STRATA_SNAPSHOT_EVERY`  | `never` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `PostgreSQL` connection string. Optional so in-memory runs need no
    /// database.
    pub database_url: Option<String>,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// When the repository snapshots aggregates after a save.
    pub snapshot_policy: SnapshotPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            snapshot_policy: SnapshotPolicy::Never,
        }
    }
}

impl StoreConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            ..Self::default()
        };

        if let Some(raw) = lookup("STRATA_MAX_CONNECTIONS") {
            config.max_connections = match raw.trim().parse::<u32>() {
                Ok(0) => {
                    return Err(ConfigError::Invalid {
                        name: "STRATA_MAX_CONNECTIONS",
                        reason: "must be at least 1".to_owned(),
                    });
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        name: "STRATA_MAX_CONNECTIONS",
                        reason: e.to_string(),
                    });
                }
            };
        }

        if let Some(raw) = lookup("STRATA_SNAPSHOT_EVERY") {
            config.snapshot_policy =
                SnapshotPolicy::from_str(&raw).map_err(|e| ConfigError::Invalid {
                    name: "STRATA_SNAPSHOT_EVERY",
                    reason: e.to_string(),
                })?;
        }

        Ok(config)
    }

    /// Opens a connection pool to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingDatabaseUrl` if no URL is configured, or
    /// `ConfigError::Connect` if the database is unreachable.
    #[tracing::instrument(skip(self), fields(max_connections = self.max_connections))]
    pub async fn connect(&self) -> Result<PgPool, ConfigError> {
        let url = self
            .database_url
            .as_deref()
            .ok_or(ConfigError::MissingDatabaseUrl)?;
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(url)
            .await?;
        tracing::info!("connected to event store database");
        Ok(pool)
    }
}
