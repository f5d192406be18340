//! PostgreSQL tracker
//!
//! The tracker database is created through the `postgres` maintenance
//! database when it does not exist yet. Column shape comes from
//! `information_schema`, which reports `CHARACTER` and `CHARACTER VARYING`
//! for the `CHAR` and `VARCHAR` columns of the table.

use async_trait::async_trait;
use ezmig_core::{ConnectionSettings, Dialect};
use sqlx::postgres::PgPool;
use sqlx::{Executor, Row};
use tracing::debug;

use super::schema::{self, LiveColumn, TABLE_NAME};
use super::transaction::{Inner, TrackerTransaction};
use super::{batch_values, migration_from_row, Persistency};
use crate::connection::postgres::open_postgres_pool;
use crate::error::{MigrateError, MigrateResult};
use crate::migration::Migration;

const COLUMNS_SQL: &str = "SELECT
    c.column_name::text AS column_name,
    upper(c.data_type::text) AS data_type,
    (c.is_nullable::text = 'YES') AS nullable,
    EXISTS (
        SELECT 1 FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage k
          ON k.constraint_name = tc.constraint_name AND k.table_schema = tc.table_schema
        WHERE tc.table_schema = c.table_schema AND tc.table_name = c.table_name
          AND tc.constraint_type = 'PRIMARY KEY' AND k.column_name = c.column_name
    ) AS is_primary,
    EXISTS (
        SELECT 1 FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage k
          ON k.constraint_name = tc.constraint_name AND k.table_schema = tc.table_schema
        WHERE tc.table_schema = c.table_schema AND tc.table_name = c.table_name
          AND tc.constraint_type = 'UNIQUE' AND k.column_name = c.column_name
          AND (SELECT count(*) FROM information_schema.key_column_usage k2
               WHERE k2.constraint_name = tc.constraint_name
                 AND k2.table_schema = tc.table_schema) = 1
    ) AS is_unique
FROM information_schema.columns c
WHERE c.table_schema = current_schema() AND c.table_name = $1
ORDER BY c.ordinal_position";

/// Tracker table kept in a PostgreSQL database
pub struct PostgresTracker {
    settings: ConnectionSettings,
    database: String,
    pool: Option<PgPool>,
}

impl PostgresTracker {
    pub fn new(settings: ConnectionSettings, database: impl Into<String>) -> Self {
        Self {
            settings,
            database: database.into(),
            pool: None,
        }
    }

    fn pool(&self) -> MigrateResult<&PgPool> {
        self.pool.as_ref().ok_or_else(|| {
            MigrateError::Tracker("PostgreSQL tracker is not initialized".to_string())
        })
    }

    async fn connect(&mut self) -> MigrateResult<()> {
        if self.pool.is_none() {
            let pool = open_postgres_pool(&self.settings, &self.database)
                .await
                .map_err(|e| MigrateError::tracker("Failed to open PostgreSQL tracker", e))?;
            debug!("Opened PostgreSQL tracker {}", self.settings.describe());
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
                let nullable: bool = row.try_get("nullable")?;
                let primary: bool = row.try_get("is_primary")?;
                let unique: bool = row.try_get("is_unique")?;
                Ok(LiveColumn::new(name, &data_type, nullable, primary, unique))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| MigrateError::tracker("Failed to decode tracker columns", e))
    }
}

impl_persistency!(PostgresTracker, Postgres);
