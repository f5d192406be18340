use async_trait::async_trait;
use ezmig_core::Dialect;
use sqlx::sqlite::SqlitePool;
use sqlx::{Executor, Row};
use std::path::PathBuf;
use tracing::debug;

use super::schema::{self, LiveColumn, TABLE_NAME};
use super::transaction::{Inner, TrackerTransaction};
use super::{batch_values, migration_from_row, Persistency};
use crate::connection::sqlite::open_sqlite_pool;
use crate::error::{MigrateError, MigrateResult};
use crate::migration::Migration;

/// Tracker table kept in a SQLite file
pub struct SqliteTracker {
    path: PathBuf,
    pool: Option<SqlitePool>,
}

impl SqliteTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: None,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn pool(&self) -> MigrateResult<&SqlitePool> {
        self.pool.as_ref().ok_or_else(|| {
            MigrateError::Tracker("SQLite tracker is not initialized".to_string())
        })
    }

    async fn connect(&mut self) -> MigrateResult<()> {
        if self.pool.is_none() {
            let pool = open_sqlite_pool(&self.path)
                .await
                .map_err(|e| MigrateError::tracker("Failed to open SQLite tracker", e))?;
            debug!("Opened SQLite tracker {}", self.path.display());
            self.pool = Some(pool);
        }
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn live_columns(&self) -> MigrateResult<Vec<LiveColumn>> {
        let pool = self.pool()?;

        let rows = sqlx::query(&format!("PRAGMA table_info({})", TABLE_NAME))
            .fetch_all(pool)
            .await
            .map_err(|e| MigrateError::tracker("Failed to read tracker columns", e))?;

        let mut unique_columns = Vec::new();
        let indexes = sqlx::query(&format!("PRAGMA index_list({})", TABLE_NAME))
            .fetch_all(pool)
            .await
            .map_err(|e| MigrateError::tracker("Failed to read tracker indexes", e))?;

        for index in indexes {
            let unique: i64 = index.try_get("unique").unwrap_or(0);
            let origin: String = index.try_get("origin").unwrap_or_default();
            if unique != 1 || origin == "pk" {
                continue;
            }

            let name: String = index
                .try_get("name")
                .map_err(|e| MigrateError::tracker("Failed to read index name", e))?;
            let columns = sqlx::query(&format!("PRAGMA index_info(\"{}\")", name.replace('"', "\"\"")))
                .fetch_all(pool)
                .await
                .map_err(|e| MigrateError::tracker("Failed to read index columns", e))?;

            if let [column] = columns.as_slice() {
                let column: String = column
                    .try_get("name")
                    .map_err(|e| MigrateError::tracker("Failed to read index column", e))?;
                unique_columns.push(column);
            }
        }

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("name")?;
                let data_type: String = row.try_get("type")?;
                let not_null: i64 = row.try_get("notnull")?;
                let pk: i64 = row.try_get("pk")?;
                let unique = unique_columns.contains(&name);
                Ok(LiveColumn::new(name, &data_type, not_null == 0, pk > 0, unique))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| MigrateError::tracker("Failed to decode tracker columns", e))
    }
}

impl_persistency!(SqliteTracker, Sqlite);
