use async_trait::async_trait;
use ezmig_core::{ConnectionSettings, Dialect};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::{ConnectOptions, Connection as _, Executor};
use tracing::{debug, info};

use super::{
    connection_error, quote_identifier, required_database, sql_origin, Connection,
    ACQUIRE_TIMEOUT, MAX_CONNECTIONS,
};
use crate::error::{MigrateError, MigrateResult};
use crate::migrations::definitions::MigrationDirection;

/// Server level options, without a default database
pub(crate) fn mysql_options(settings: &ConnectionSettings) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .username(&settings.user);
    if let Some(password) = &settings.password {
        options = options.password(password);
    }
    options
}

/// Create `database` unless it already exists
pub(crate) async fn ensure_mysql_database(
    settings: &ConnectionSettings,
    database: &str,
) -> Result<(), sqlx::Error> {
    let mut conn = mysql_options(settings).connect().await?;
    let sql = format!(
        "CREATE DATABASE IF NOT EXISTS {}",
        quote_identifier(Dialect::MySql, database)
    );
    conn.execute(sql.as_str()).await?;
    conn.close().await?;
    debug!("Database {} is available", database);
    Ok(())
}

/// Pool bound to `database`, which is created first when missing
pub(crate) async fn open_mysql_pool(
    settings: &ConnectionSettings,
    database: &str,
) -> Result<MySqlPool, sqlx::Error> {
    ensure_mysql_database(settings, database).await?;

    MySqlPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(mysql_options(settings).database(database))
        .await
}

/// Target database on a MySQL server
pub struct MySqlConnection {
    settings: ConnectionSettings,
    database: String,
    pool: Option<MySqlPool>,
    current: Option<String>,
}

impl MySqlConnection {
    pub fn new(settings: &ConnectionSettings) -> MigrateResult<Self> {
        Ok(Self {
            database: required_database(settings)?,
            settings: settings.clone(),
            pool: None,
            current: None,
        })
    }

    async fn pool(&mut self) -> MigrateResult<&MySqlPool> {
        if self.pool.is_none() {
            let pool = open_mysql_pool(&self.settings, &self.database)
                .await
                .map_err(|e| connection_error(&self.settings, e))?;
            info!("Connected to MySQL database {}", self.database);
            self.pool = Some(pool);
        }
        self.pool
            .as_ref()
            .ok_or_else(|| MigrateError::Connection("MySQL pool is not open".to_string()))
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    fn dbms_name(&self) -> Dialect {
        Dialect::MySql
    }

    async fn test_connectivity(&mut self) -> MigrateResult<()> {
        if let Some(pool) = &self.pool {
            pool.execute("SELECT 1")
                .await
                .map_err(|e| connection_error(&self.settings, e))?;
            return Ok(());
        }

        let mut conn = mysql_options(&self.settings)
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
            debug!("Closed MySQL connection to {}", self.database);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(database: Option<&str>) -> ConnectionSettings {
        ConnectionSettings::resolve(Dialect::MySql, &Default::default(), |key| match key {
            "DB_NAME" => database.map(str::to_string),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_new_requires_a_database() {
        assert!(MySqlConnection::new(&settings(None)).is_err());

        let connection = MySqlConnection::new(&settings(Some("shop"))).unwrap();
        assert_eq!(connection.database, "shop");
        assert_eq!(connection.dbms_name(), Dialect::MySql);
    }

    #[tokio::test]
    async fn test_close_without_pool_is_noop() {
        let mut connection = MySqlConnection::new(&settings(Some("shop"))).unwrap();
        connection.close().await.unwrap();
        connection.close().await.unwrap();
    }
}
