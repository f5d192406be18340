//! Tracker: the durable record of applied migrations
//!
//! [`Persistency`] is the capability set every tracker store offers. Writes
//! return an open [`TrackerTransaction`] so the caller decides whether the
//! staged rows are kept, once it knows whether the migration SQL succeeded.

/// Implements [`Persistency`] for a tracker owning a `pool: Option<Pool<_>>`.
///
/// The tracker supplies `connect`, `pool`, `live_columns` and `location`.
/// Names resolve in the invoking module, which imports what the body uses.
macro_rules! impl_persistency {
    ($tracker:ty, $variant:ident) => {
        #[async_trait]
        impl Persistency for $tracker {
            fn dialect(&self) -> Dialect {
                Dialect::$variant
            }

            async fn init(&mut self) -> MigrateResult<()> {
                self.connect().await?;

                let columns = self.live_columns().await?;
                if columns.is_empty() {
                    self.pool()?
                        .execute(schema::create_table_sql().as_str())
                        .await
                        .map_err(|e| MigrateError::tracker("Failed to create tracker table", e))?;
                    tracing::info!("Tracker table {} created in {}", schema::TABLE_NAME, self.location());
                    return Ok(());
                }

                schema::verify_schema(Dialect::$variant, &columns)
            }

            async fn save(&self, migrations: &[Migration]) -> MigrateResult<TrackerTransaction> {
                let values = batch_values(migrations)?;
                let mut tx = self
                    .pool()?
                    .begin()
                    .await
                    .map_err(|e| MigrateError::tracker("Failed to start tracker transaction", e))?;

                if !migrations.is_empty() {
                    let sql = schema::insert_sql(Dialect::$variant, migrations.len());
                    let mut query = sqlx::query(&sql);
                    for value in values {
                        query = query.bind(value);
                    }
                    query
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| MigrateError::tracker("Failed to record migrations", e))?;
                }

                Ok(TrackerTransaction::new(
                    Inner::$variant(tx),
                    format!("save {} migration(s)", migrations.len()),
                ))
            }

            async fn remove_migrations(&self, migrations: &[Migration]) -> MigrateResult<TrackerTransaction> {
                let mut tx = self
                    .pool()?
                    .begin()
                    .await
                    .map_err(|e| MigrateError::tracker("Failed to start tracker transaction", e))?;

                if !migrations.is_empty() {
                    let sql = schema::delete_sql(Dialect::$variant, migrations.len());
                    let mut query = sqlx::query(&sql);
                    for migration in migrations {
                        query = query.bind(migration.migrated_at());
                    }
                    let removed = query
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| MigrateError::tracker("Failed to remove migrations", e))?
                        .rows_affected();

                    // One row per migration, or nothing is removed
                    if removed != migrations.len() as u64 {
                        tx.rollback()
                            .await
                            .map_err(|e| MigrateError::tracker("Failed to rollback tracker transaction", e))?;
                        return Err(MigrateError::Tracker(format!(
                            "Expected to remove {} recorded migration(s) but {} matched, nothing was reverted",
                            migrations.len(),
                            removed
                        )));
                    }
                }

                Ok(TrackerTransaction::new(
                    Inner::$variant(tx),
                    format!("remove {} migration(s)", migrations.len()),
                ))
            }

            async fn list(&self) -> MigrateResult<Vec<Migration>> {
                let rows = sqlx::query(&schema::select_all_sql())
                    .fetch_all(self.pool()?)
                    .await
                    .map_err(|e| MigrateError::tracker("Failed to list migrations", e))?;
                rows.iter().map(migration_from_row).collect()
            }

            async fn get_last_migration_done(&self) -> MigrateResult<Option<Migration>> {
                let row = sqlx::query(&schema::select_last_sql())
                    .fetch_optional(self.pool()?)
                    .await
                    .map_err(|e| MigrateError::tracker("Failed to read the last migration", e))?;
                row.as_ref().map(migration_from_row).transpose()
            }

            async fn get_last_batch_migration_done(&self) -> MigrateResult<Option<Vec<Migration>>> {
                let Some(last) = self.get_last_migration_done().await? else {
                    return Ok(None);
                };

                let rows = sqlx::query(&schema::select_batch_sql(Dialect::$variant))
                    .bind(last.batch_id().unwrap_or_default())
                    .fetch_all(self.pool()?)
                    .await
                    .map_err(|e| MigrateError::tracker("Failed to read the last batch", e))?;
                let batch = rows
                    .iter()
                    .map(migration_from_row)
                    .collect::<MigrateResult<Vec<_>>>()?;
                Ok(Some(batch))
            }

            async fn close(&mut self) -> MigrateResult<()> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                    tracing::debug!("Closed {} tracker {}", Dialect::$variant, self.location());
                }
                Ok(())
            }
        }
    };
}

mod mysql;
mod postgres;
pub mod schema;
mod sqlite;
mod transaction;

pub use mysql::MySqlTracker;
pub use postgres::PostgresTracker;
pub use sqlite::SqliteTracker;
pub use transaction::TrackerTransaction;

use async_trait::async_trait;
use ezmig_core::{ConnectionSettings, Dialect, MigrateConfig};

use crate::connection::required_database;
use crate::error::{MigrateError, MigrateResult};
use crate::migration::Migration;

/// Storage of applied migrations
#[async_trait]
pub trait Persistency: Send + Sync {
    /// Dialect of the tracker store
    fn dialect(&self) -> Dialect;

    /// Create the tracker store and table when missing, otherwise verify the table shape
    async fn init(&mut self) -> MigrateResult<()>;

    /// Stage one row per migration
    async fn save(&self, migrations: &[Migration]) -> MigrateResult<TrackerTransaction>;

    /// Stage the removal of one migration
    async fn remove_migration(&self, migration: &Migration) -> MigrateResult<TrackerTransaction> {
        self.remove_migrations(std::slice::from_ref(migration)).await
    }

    /// Stage the removal of several migrations
    async fn remove_migrations(&self, migrations: &[Migration]) -> MigrateResult<TrackerTransaction>;

    /// Every recorded migration, in no particular order
    async fn list(&self) -> MigrateResult<Vec<Migration>>;

    /// Migration with the greatest `migrated_at`
    async fn get_last_migration_done(&self) -> MigrateResult<Option<Migration>>;

    /// Migrations sharing the batch of the last migration, newest first
    async fn get_last_batch_migration_done(&self) -> MigrateResult<Option<Vec<Migration>>>;

    /// Release the store; calling it again is a no-op
    async fn close(&mut self) -> MigrateResult<()>;
}

/// Tracker backed by one of the supported dialects
pub enum Tracker {
    Sqlite(SqliteTracker),
    MySql(MySqlTracker),
    Postgres(PostgresTracker),
}

impl Tracker {
    fn inner(&self) -> &dyn Persistency {
        match self {
            Tracker::Sqlite(tracker) => tracker,
            Tracker::MySql(tracker) => tracker,
            Tracker::Postgres(tracker) => tracker,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Persistency {
        match self {
            Tracker::Sqlite(tracker) => tracker,
            Tracker::MySql(tracker) => tracker,
            Tracker::Postgres(tracker) => tracker,
        }
    }
}

#[async_trait]
impl Persistency for Tracker {
    fn dialect(&self) -> Dialect {
        self.inner().dialect()
    }

    async fn init(&mut self) -> MigrateResult<()> {
        self.inner_mut().init().await
    }

    async fn save(&self, migrations: &[Migration]) -> MigrateResult<TrackerTransaction> {
        self.inner().save(migrations).await
    }

    async fn remove_migration(&self, migration: &Migration) -> MigrateResult<TrackerTransaction> {
        self.inner().remove_migration(migration).await
    }

    async fn remove_migrations(&self, migrations: &[Migration]) -> MigrateResult<TrackerTransaction> {
        self.inner().remove_migrations(migrations).await
    }

    async fn list(&self) -> MigrateResult<Vec<Migration>> {
        self.inner().list().await
    }

    async fn get_last_migration_done(&self) -> MigrateResult<Option<Migration>> {
        self.inner().get_last_migration_done().await
    }

    async fn get_last_batch_migration_done(&self) -> MigrateResult<Option<Vec<Migration>>> {
        self.inner().get_last_batch_migration_done().await
    }

    async fn close(&mut self) -> MigrateResult<()> {
        self.inner_mut().close().await
    }
}

/// Builds the [`Tracker`] for the configured tracker dialect
pub struct TrackerFactory;

impl TrackerFactory {
    pub fn create(settings: &ConnectionSettings) -> MigrateResult<Tracker> {
        let tracker = match settings.dialect {
            Dialect::Sqlite => {
                let path = settings.sqlite_path.clone().ok_or_else(|| {
                    MigrateError::Configuration("No SQLite tracker file configured".to_string())
                })?;
                Tracker::Sqlite(SqliteTracker::new(path))
            }
            Dialect::MySql => Tracker::MySql(MySqlTracker::new(
                settings.clone(),
                required_database(settings)?,
            )),
            Dialect::Postgres => Tracker::Postgres(PostgresTracker::new(
                settings.clone(),
                required_database(settings)?,
            )),
        };
        tracing::debug!("Using {} tracker {}", settings.dialect, settings.describe());
        Ok(tracker)
    }

    pub fn from_config(config: &MigrateConfig) -> MigrateResult<Tracker> {
        Self::create(&config.tracker_settings()?)
    }
}

/// Values to bind for a bulk insert, in [`schema::COLUMNS`] order
pub(crate) fn batch_values(migrations: &[Migration]) -> MigrateResult<Vec<String>> {
    let mut values = Vec::with_capacity(migrations.len() * schema::COLUMNS.len());
    for migration in migrations {
        let batch_id = migration.batch_id().ok_or_else(|| {
            MigrateError::BatchIntegrity(format!(
                "Migration {} has no batch id and cannot be recorded",
                migration.path()
            ))
        })?;
        values.extend([
            batch_id.to_string(),
            migration.migrated_at().to_string(),
            migration.up().to_string(),
            migration.down().to_string(),
            migration.path().to_string(),
        ]);
    }
    Ok(values)
}

/// Rebuild a [`Migration`] from a tracker row
pub(crate) fn migration_from_row<R>(row: &R) -> MigrateResult<Migration>
where
    R: sqlx::Row,
    for<'r> String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    for<'a> &'a str: sqlx::ColumnIndex<R>,
{
    let read = |column: &str| -> MigrateResult<String> {
        row.try_get::<String, _>(column)
            .map_err(|e| MigrateError::tracker(&format!("Failed to read column {}", column), e))
    };

    let batch_id = read("batch_id")?;
    Migration::from_record(
        Some(batch_id).filter(|id| !id.is_empty()),
        read("migrated_at")?,
        read("up")?,
        read("down")?,
        read("path")?,
    )
}
