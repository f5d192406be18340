//! Connections to the migration target database
//!
//! A [`Connection`] runs migration and seed SQL against the target. Pools are
//! opened lazily: `test_connectivity` only reaches the server, while
//! `initialize` makes sure the target database exists and binds to it.

pub(crate) mod mysql;
pub(crate) mod postgres;
pub(crate) mod sqlite;

pub use mysql::MySqlConnection;
pub use postgres::PostgresConnection;
pub use sqlite::SqliteConnection;

use async_trait::async_trait;
use ezmig_core::{ConnectionSettings, Dialect, MigrateConfig};
use std::time::Duration;

use crate::error::{MigrateError, MigrateResult};
use crate::migrations::definitions::MigrationDirection;

/// How long a pool waits for a free connection
pub(crate) const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const MAX_CONNECTIONS: u32 = 5;

/// A target database that migration and seed SQL runs against
#[async_trait]
pub trait Connection: Send + Sync {
    /// Dialect of the target database
    fn dbms_name(&self) -> Dialect;

    /// Check the database server answers
    async fn test_connectivity(&mut self) -> MigrateResult<()>;

    /// Prepare the connection for running `path` in `direction`
    async fn initialize(
        &mut self,
        path: Option<&str>,
        direction: Option<MigrationDirection>,
    ) -> MigrateResult<()>;

    /// Run `sql`, which may hold several statements
    async fn run_sql(&mut self, sql: &str) -> MigrateResult<()>;

    /// Release the pool; calling it again is a no-op
    async fn close(&mut self) -> MigrateResult<()>;
}

/// Builds the [`Connection`] matching the configured dialect
pub struct ConnectionFactory;

impl ConnectionFactory {
    pub fn create(settings: &ConnectionSettings) -> MigrateResult<Box<dyn Connection>> {
        let connection: Box<dyn Connection> = match settings.dialect {
            Dialect::Sqlite => Box::new(SqliteConnection::new(settings)?),
            Dialect::MySql => Box::new(MySqlConnection::new(settings)?),
            Dialect::Postgres => Box::new(PostgresConnection::new(settings)?),
        };
        tracing::debug!("Using {} target {}", settings.dialect, settings.describe());
        Ok(connection)
    }

    pub fn from_config(config: &MigrateConfig) -> MigrateResult<Box<dyn Connection>> {
        Self::create(&config.target_settings()?)
    }
}

/// Name of the database a server connection binds to
pub(crate) fn required_database(settings: &ConnectionSettings) -> MigrateResult<String> {
    settings
        .database
        .clone()
        .filter(|db| !db.trim().is_empty())
        .ok_or_else(|| {
            MigrateError::Configuration(format!(
                "No database name configured for {} connection",
                settings.dialect
            ))
        })
}

/// Quote a database name for `CREATE DATABASE`
pub(crate) fn quote_identifier(dialect: Dialect, name: &str) -> String {
    match dialect {
        Dialect::MySql => format!("`{}`", name.replace('`', "``")),
        Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
    }
}

/// Connection error naming the target without its password
pub(crate) fn connection_error(settings: &ConnectionSettings, source: impl std::fmt::Display) -> MigrateError {
    MigrateError::Connection(format!(
        "Failed to connect to {}: {}",
        settings.describe(),
        source
    ))
}

/// Migration path the current statement belongs to, for error reports
pub(crate) fn sql_origin(path: &Option<String>) -> String {
    path.clone().unwrap_or_else(|| "<sql>".to_string())
}
