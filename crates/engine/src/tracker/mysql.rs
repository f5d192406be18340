use async_trait::async_trait;
use ezmig_core::{ConnectionSettings, Dialect};
use sqlx::mysql::MySqlPool;
use sqlx::{Executor, Row};
use tracing::debug;

use super::schema::{self, LiveColumn, TABLE_NAME};
use super::transaction::{Inner, TrackerTransaction};
use super::{batch_values, migration_from_row, Persistency};
use crate::connection::mysql::open_mysql_pool;
use crate::error::{MigrateError, MigrateResult};
use crate::migration::Migration;

/// Reads the tracker table shape from `information_schema`
const COLUMNS_SQL: &str = "SELECT
    CAST(c.COLUMN_NAME AS CHAR) AS column_name,
    CAST(c.DATA_TYPE AS CHAR) AS data_type,
    CAST(c.IS_NULLABLE = 'YES' AS SIGNED) AS nullable,
    CAST(EXISTS (
        SELECT 1 FROM information_schema.STATISTICS s
        WHERE s.TABLE_SCHEMA = c.TABLE_SCHEMA AND s.TABLE_NAME = c.TABLE_NAME
          AND s.COLUMN_NAME = c.COLUMN_NAME AND s.INDEX_NAME = 'PRIMARY'
    ) AS SIGNED) AS is_primary,
    CAST(EXISTS (
        SELECT 1 FROM information_schema.STATISTICS s
        WHERE s.TABLE_SCHEMA = c.TABLE_SCHEMA AND s.TABLE_NAME = c.TABLE_NAME
          AND s.COLUMN_NAME = c.COLUMN_NAME AND s.NON_UNIQUE = 0 AND s.INDEX_NAME <> 'PRIMARY'
          AND (SELECT COUNT(*) FROM information_schema.STATISTICS s2
               WHERE s2.TABLE_SCHEMA = s.TABLE_SCHEMA AND s2.TABLE_NAME = s.TABLE_NAME
                 AND s2.INDEX_NAME = s.INDEX_NAME) = 1
    ) AS SIGNED) AS is_unique
FROM information_schema.COLUMNS c
WHERE c.TABLE_SCHEMA = DATABASE() AND c.TABLE_NAME = ?
ORDER BY c.ORDINAL_POSITION";

/// Tracker table kept in a MySQL database
pub struct MySqlTracker {
    settings: ConnectionSettings,
    database: String,
    pool: Option<MySqlPool>,
}

impl MySqlTracker {
    pub fn new(settings: ConnectionSettings, database: impl Into<String>) -> Self {
        Self {
            settings,
            database: database.into(),
            pool: None,
        }
    }

    fn pool(&self) -> MigrateResult<&MySqlPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| MigrateError::Tracker("MySQL tracker is not initialized".to_string()))
    }

    async fn connect(&mut self) -> MigrateResult<()> {
        if self.pool.is_none() {
            let pool = open_mysql_pool(&self.settings, &self.database)
                .await
                .map_err(|e| MigrateError::tracker("Failed to open MySQL tracker", e))?;
            debug!("Opened MySQL tracker {}", self.settings.describe());
            self.pool = Some(pool);
        }
        Ok(())
    }

    fn location(&self) -> String {
        format!("database {}", self.database)
    }

    async fn live_columns(&self) -> MigrateResult<Vec<LiveColumn>> {
        let rows = sqlx::query(COLUMNS_SQL)
            .bind(TABLE_NAME)
            .fetch_all(self.pool()?)
            .await
            .map_err(|e| MigrateError::tracker("Failed to read tracker columns", e))?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("column_name")?;
                let data_type: String = row.try_get("data_type")?;
                let nullable: i64 = row.try_get("nullable")?;
                let primary: i64 = row.try_get("is_primary")?;
                let unique: i64 = row.try_get("is_unique")?;
                Ok(LiveColumn::new(name, &data_type, nullable != 0, primary != 0, unique != 0))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| MigrateError::tracker("Failed to decode tracker columns", e))
    }
}

impl_persistency!(MySqlTracker, MySql);
