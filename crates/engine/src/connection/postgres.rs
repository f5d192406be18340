//! PostgreSQL target connection
//!
//! Database creation goes through the `postgres` maintenance database, since
//! a PostgreSQL connection is always bound to an existing database.

use async_trait::async_trait;
use ezmig_core::{ConnectionSettings, Dialect};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{ConnectOptions, Connection as _, Executor};
use tracing::{debug, info};

use super::{
    connection_error, quote_identifier, required_database, sql_origin, Connection,
    ACQUIRE_TIMEOUT, MAX_CONNECTIONS,
};
use crate::error::{MigrateError, MigrateResult};
use crate::migrations::definitions::MigrationDirection;

/// Database every PostgreSQL server carries
pub(crate) const MAINTENANCE_DATABASE: &str = "postgres";

pub(crate) fn postgres_options(settings: &ConnectionSettings, database: &str) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .username(&settings.user)
        .database(database);
    if let Some(password) = &settings.password {
        options = options.password(password);
    }
    options
}

/// Create `database` unless `pg_database` already lists it
pub(crate) async fn ensure_postgres_database(
    settings: &ConnectionSettings,
    database: &str,
) -> Result<(), sqlx::Error> {
    let mut conn = postgres_options(settings, MAINTENANCE_DATABASE).connect().await?;

    let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(database)
        .fetch_optional(&mut conn)
        .await?;

    if exists.is_none() {
        let sql = format!(
            "CREATE DATABASE {}",
            quote_identifier(Dialect::Postgres, database)
        );
        conn.execute(sql.as_str()).await?;
        info!("Created database {}", database);
    }

    conn.close().await?;
    Ok(())
}

/// Pool bound to `database`, which is created first when missing
pub(crate) async fn open_postgres_pool(
    settings: &ConnectionSettings,
    database: &str,
) -> Result<PgPool, sqlx::Error> {
    ensure_postgres_database(settings, database).await?;

    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(postgres_options(settings, database))
        .await
}

/// Target database on a PostgreSQL server
pub struct PostgresConnection {
    settings: ConnectionSettings,
    database: String,
    pool: Option<PgPool>,
    current: Option<String>,
}

impl PostgresConnection {
    pub fn new(settings: &ConnectionSettings) -> MigrateResult<Self> {
        Ok(Self {
            database: required_database(settings)?,
            settings: settings.clone(),
            pool: None,
            current: None,
        })
    }

    async fn pool(&mut self) -> MigrateResult<&PgPool> {
        if self.pool.is_none() {
            let pool = open_postgres_pool(&self.settings, &self.database)
                .await
                .map_err(|e| connection_error(&self.settings, e))?;
            info!("Connected to PostgreSQL database {}", self.database);
            self.pool = Some(pool);
        }
        self.pool
            .as_ref()
            .ok_or_else(|| MigrateError::Connection("PostgreSQL pool is not open".to_string()))
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn dbms_name(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn test_connectivity(&mut self) -> MigrateResult<()> {
        if let Some(pool) = &self.pool {
            pool.execute("SELECT 1")
                .await
                .map_err(|e| connection_error(&self.settings, e))?;
            return Ok(());
        }

        let mut conn = postgres_options(&self.settings, MAINTENANCE_DATABASE)
            .connect()
            .await
            .map_err(|e| connection_error(&self.settings, e))?;
        conn.ping()
            .await
            .map_err(|e| connection_error(&self.settings, e))?;
        conn.close()
            .await
            .map_err(|e| connection_error(&self.settings, e))?;
        Ok(())
    }

    async fn initialize(
        &mut self,
        path: Option<&str>,
        direction: Option<MigrationDirection>,
    ) -> MigrateResult<()> {
        self.pool().await?;
        self.current = path.map(str::to_string);
        if let (Some(path), Some(direction)) = (path, direction) {
            debug!("Running {} {} on {}", direction, path, self.settings.describe());
        }
        Ok(())
    }

    async fn run_sql(&mut self, sql: &str) -> MigrateResult<()> {
        let origin = sql_origin(&self.current);
        debug!("Executing SQL from {}:\n{}", origin, sql);
        let pool = self.pool().await?;
        pool.execute(sql)
            .await
            .map_err(|e| MigrateError::sql_execution(origin, e))?;
        Ok(())
    }

    async fn close(&mut self) -> MigrateResult<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("Closed PostgreSQL connection to {}", self.database);
        }
        Ok(())
    }
}
