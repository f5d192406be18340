//! Migration Executor - Runs migrations against the target database
//!
//! Every run stages its tracker write first and executes the migration SQL
//! second. The staged write is committed only when the SQL succeeded, so the
//! tracker never records a migration the target did not receive.

use std::time::Instant;
use tracing::{error, info, warn};

use super::definitions::{MigrationDirection, RunReport};
use crate::connection::Connection;
use crate::error::MigrateResult;
use crate::migration::{new_batch_id, Migration};
use crate::repository::Repository;
use crate::tracker::TrackerTransaction;

/// Migration executor that couples target SQL with tracker writes
pub struct MigrationExecutor {
    pub(super) connection: Box<dyn Connection>,
    pub(super) repository: Repository,
}

impl MigrationExecutor {
    pub fn new(connection: Box<dyn Connection>, repository: Repository) -> Self {
        Self {
            connection,
            repository,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut Repository {
        &mut self.repository
    }

    /// Apply one migration. Migrations without a batch get a batch of their own.
    pub async fn execute_single_migration_up(&mut self, migration: &Migration) -> MigrateResult<RunReport> {
        let started = Instant::now();
        let migration = match migration.batch_id() {
            Some(_) => migration.clone(),
            None => migration.in_batch(&new_batch_id()),
        };

        self.prepare(migration.path(), MigrationDirection::Up).await?;
        let tx = self.repository.save(std::slice::from_ref(&migration)).await?;
        let result = self.connection.run_sql(migration.up()).await;
        settle(tx, result).await?;

        info!("Migration applied: {}", migration.path());
        Ok(RunReport::finish(
            vec![migration.path().to_string()],
            migration.batch_id().map(str::to_string),
            started,
        ))
    }

    /// Revert one recorded migration
    pub async fn execute_single_migration_down(&mut self, migration: &Migration) -> MigrateResult<RunReport> {
        let started = Instant::now();

        self.prepare(migration.path(), MigrationDirection::Down).await?;
        let tx = self.repository.remove_migration(migration).await?;
        let result = self.connection.run_sql(migration.down()).await;
        settle(tx, result).await?;

        info!("Migration reverted: {}", migration.path());
        Ok(RunReport::finish(
            vec![migration.path().to_string()],
            migration.batch_id().map(str::to_string),
            started,
        ))
    }

    /// Apply migrations in order, each in its own tracker transaction.
    ///
    /// The first failure stops the run. Migrations applied before it stay
    /// recorded.
    pub async fn execute_migrations_up(&mut self, migrations: &[Migration]) -> MigrateResult<RunReport> {
        let mut report = RunReport::default();

        for (index, migration) in migrations.iter().enumerate() {
            match self.execute_single_migration_up(migration).await {
                Ok(done) => report.merge(done),
                Err(e) => {
                    if index > 0 {
                        warn!(
                            "Stopped after {} of {} migrations, {} remain pending",
                            index,
                            migrations.len(),
                            migrations.len() - index
                        );
                    }
                    return Err(e);
                }
            }
        }

        Ok(report)
    }

    /// Release the target connection and the tracker
    pub async fn close(&mut self) -> MigrateResult<()> {
        let connection = self.connection.close().await;
        let repository = self.repository.close().await;
        connection.and(repository)
    }

    pub(super) async fn prepare(&mut self, path: &str, direction: MigrationDirection) -> MigrateResult<()> {
        self.connection.test_connectivity().await?;
        self.connection.initialize(Some(path), Some(direction)).await
    }
}

/// Commit `tx` when the SQL succeeded, roll it back otherwise
pub(super) async fn settle(tx: TrackerTransaction, result: MigrateResult<()>) -> MigrateResult<()> {
    match result {
        Ok(()) => tx.commit().await,
        Err(e) => {
            error!("{}", e);
            match tx.rollback().await {
                Ok(()) => warn!("Tracker changes rolled back"),
                Err(rollback) => warn!("Tracker rollback failed: {}", rollback),
            }
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tracker::SqliteTracker;
    use async_trait::async_trait;
    use ezmig_core::Dialect;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Target that records the SQL it receives and fails on demand
    #[derive(Clone, Default)]
    pub(crate) struct RecordingConnection {
        pub executed: Arc<Mutex<Vec<String>>>,
        pub calls: Arc<Mutex<usize>>,
        pub fail_on: Option<String>,
    }

    #[async_trait]
    impl Connection for RecordingConnection {
        fn dbms_name(&self) -> Dialect {
            Dialect::Sqlite
        }

        async fn test_connectivity(&mut self) -> MigrateResult<()> {
            *self.calls.lock().unwrap() += 1;
            Ok(())
        }

        async fn initialize(
            &mut self,
            _path: Option<&str>,
            _direction: Option<MigrationDirection>,
        ) -> MigrateResult<()> {
            *self.calls.lock().unwrap() += 1;
            Ok(())
        }

        async fn run_sql(&mut self, sql: &str) -> MigrateResult<()> {
            *self.calls.lock().unwrap() += 1;
            if let Some(marker) = &self.fail_on {
                if sql.contains(marker.as_str()) {
                    return Err(crate::error::MigrateError::sql_execution("<test>", "boom"));
                }
            }
            self.executed.lock().unwrap().push(sql.to_string());
            Ok(())
        }

        async fn close(&mut self) -> MigrateResult<()> {
            Ok(())
        }
    }

    pub(crate) async fn executor(temp: &TempDir, connection: RecordingConnection) -> MigrationExecutor {
        let mut repository = Repository::new(SqliteTracker::new(temp.path().join("tracker.db")));
        repository.init().await.unwrap();
        MigrationExecutor::new(Box::new(connection), repository)
    }

    pub(crate) fn migration(batch_id: Option<&str>, name: &str) -> Migration {
        Migration::new(
            batch_id.map(str::to_string),
            format!("CREATE TABLE {} (id INT)", name),
            format!("DROP TABLE {}", name),
            format!("migrations/{}.sql", name),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_single_up_records_after_success() {
        let temp = TempDir::new().unwrap();
        let connection = RecordingConnection::default();
        let mut executor = executor(&temp, connection.clone()).await;

        let report = executor
            .execute_single_migration_up(&migration(None, "users"))
            .await
            .unwrap();
        assert_eq!(report.count(), 1);
        assert!(report.batch_id.is_some());

        let recorded = executor.repository().list().await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].batch_id(), report.batch_id.as_deref());
        assert_eq!(connection.executed.lock().unwrap().len(), 1);
        executor.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_sql_leaves_no_row() {
        let temp = TempDir::new().unwrap();
        let connection = RecordingConnection {
            fail_on: Some("broken".to_string()),
            ..Default::default()
        };
        let mut executor = executor(&temp, connection).await;

        let result = executor
            .execute_single_migration_up(&migration(Some("b1"), "broken"))
            .await;
        assert!(matches!(result, Err(crate::error::MigrateError::SqlExecution { .. })));
        assert!(executor.repository().list().await.unwrap().is_empty());
        executor.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_up_batch_stops_at_first_failure() {
        let temp = TempDir::new().unwrap();
        let connection = RecordingConnection {
            fail_on: Some("broken".to_string()),
            ..Default::default()
        };
        let mut executor = executor(&temp, connection.clone()).await;

        let batch = [
            migration(Some("b1"), "first"),
            migration(Some("b1"), "broken"),
            migration(Some("b1"), "third"),
        ];
        assert!(executor.execute_migrations_up(&batch).await.is_err());

        let recorded = executor.repository().list().await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].file_name(), "first.sql");
        assert_eq!(connection.executed.lock().unwrap().len(), 1);
        executor.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_single_down_removes_the_row() {
        let temp = TempDir::new().unwrap();
        let connection = RecordingConnection::default();
        let mut executor = executor(&temp, connection.clone()).await;

        executor
            .execute_single_migration_up(&migration(Some("b1"), "users"))
            .await
            .unwrap();
        let recorded = executor.repository().get_last_migration_done().await.unwrap().unwrap();

        executor.execute_single_migration_down(&recorded).await.unwrap();
        assert!(executor.repository().list().await.unwrap().is_empty());
        assert_eq!(
            connection.executed.lock().unwrap().last().map(String::as_str),
            Some("DROP TABLE users")
        );
        executor.close().await.unwrap();
        executor.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_down_of_unrecorded_migration_runs_no_sql() {
        let temp = TempDir::new().unwrap();
        let connection = RecordingConnection::default();
        let mut executor = executor(&temp, connection.clone()).await;

        executor
            .execute_single_migration_up(&migration(Some("b1"), "users"))
            .await
            .unwrap();

        let result = executor
            .execute_single_migration_down(&migration(None, "users"))
            .await;
        assert!(matches!(result, Err(crate::error::MigrateError::Tracker(_))));
        assert_eq!(
            *connection.executed.lock().unwrap(),
            vec!["CREATE TABLE users (id INT)".to_string()]
        );
        assert_eq!(executor.repository().list().await.unwrap().len(), 1);
        executor.close().await.unwrap();
    }
}
