use async_trait::async_trait;
use ezmig_core::{ConnectionSettings, Dialect};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Executor;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{connection_error, sql_origin, Connection, ACQUIRE_TIMEOUT, MAX_CONNECTIONS};
use crate::error::{MigrateError, MigrateResult};
use crate::migrations::definitions::MigrationDirection;

/// Open a pool on the SQLite file at `path`, creating the file and its parent directories
pub(crate) async fn open_sqlite_pool(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await
}

/// Target database stored in a SQLite file
pub struct SqliteConnection {
    settings: ConnectionSettings,
    path: PathBuf,
    pool: Option<SqlitePool>,
    current: Option<String>,
}

impl SqliteConnection {
    pub fn new(settings: &ConnectionSettings) -> MigrateResult<Self> {
        let path = settings.sqlite_path.clone().ok_or_else(|| {
            MigrateError::Configuration("No SQLite database file configured".to_string())
        })?;

        Ok(Self {
            settings: settings.clone(),
            path,
            pool: None,
            current: None,
        })
    }

    async fn pool(&mut self) -> MigrateResult<&SqlitePool> {
        if self.pool.is_none() {
            let pool = open_sqlite_pool(&self.path)
                .await
                .map_err(|e| connection_error(&self.settings, e))?;
            self.pool = Some(pool);
        }
        self.pool
            .as_ref()
            .ok_or_else(|| MigrateError::Connection("SQLite pool is not open".to_string()))
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn dbms_name(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn test_connectivity(&mut self) -> MigrateResult<()> {
        let settings = self.settings.clone();
        let pool = self.pool().await?;
        pool.execute("SELECT 1")
            .await
            .map_err(|e| connection_error(&settings, e))?;
        Ok(())
    }

    async fn initialize(
        &mut self,
        path: Option<&str>,
        direction: Option<MigrationDirection>,
    ) -> MigrateResult<()> {
        self.current = path.map(str::to_string);
        match (path, direction) {
            (Some(path), Some(direction)) => {
                debug!("Running {} {} on {}", direction, path, self.path.display())
            }
            _ => debug!("Using SQLite database {}", self.path.display()),
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
            debug!("Closed SQLite database {}", self.path.display());
        }
        Ok(())
    }
}
