//! Migration Rollback - Reverts a whole batch of applied migrations
//!
//! A batch is reverted with one tracker transaction and one execution of the
//! concatenated down SQL, so either every row of the batch goes away or none
//! does.

use std::collections::BTreeSet;
use std::time::Instant;
use tracing::info;

use super::definitions::{MigrationDirection, RunReport};
use super::executor::{settle, MigrationExecutor};
use crate::error::{MigrateError, MigrateResult};
use crate::migration::Migration;

/// The single batch id shared by `migrations`.
///
/// Fails when the list is empty, when a migration has no batch id or when
/// more than one batch is present.
pub fn ensure_single_batch(migrations: &[Migration]) -> MigrateResult<String> {
    if migrations.is_empty() {
        return Err(MigrateError::BatchIntegrity(
            "No migrations were given to roll back".to_string(),
        ));
    }

    let mut batches = BTreeSet::new();
    for migration in migrations {
        match migration.batch_id() {
            Some(batch_id) => {
                batches.insert(batch_id);
            }
            None => {
                return Err(MigrateError::BatchIntegrity(format!(
                    "Migration {} does not belong to a batch",
                    migration.path()
                )))
            }
        }
    }

    match batches.into_iter().collect::<Vec<_>>().as_slice() {
        [batch_id] => Ok(batch_id.to_string()),
        several => Err(MigrateError::BatchIntegrity(format!(
            "Migrations belong to {} different batches ({}), only one batch can be rolled back at a time",
            several.len(),
            several.join(", ")
        ))),
    }
}

/// Down SQL of every migration, in the given order
fn concatenated_down(migrations: &[Migration]) -> String {
    migrations
        .iter()
        .map(|migration| {
            let sql = migration.down().trim();
            if sql.ends_with(';') {
                sql.to_string()
            } else {
                format!("{}\n;", sql)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl MigrationExecutor {
    /// Revert `migrations`, which must all share one batch, in the given order
    pub async fn execute_migrations_down(&mut self, migrations: &[Migration]) -> MigrateResult<RunReport> {
        let batch_id = ensure_single_batch(migrations)?;
        let started = Instant::now();

        let label = match migrations {
            [single] => single.path().to_string(),
            _ => format!("batch {}", batch_id),
        };
        self.prepare(&label, MigrationDirection::Down).await?;

        let tx = self.repository.remove_migrations(migrations).await?;
        let result = self.connection.run_sql(&concatenated_down(migrations)).await;
        settle(tx, result).await?;

        let paths: Vec<String> = migrations.iter().map(|m| m.path().to_string()).collect();
        info!("Batch {} reverted ({} migrations)", batch_id, paths.len());
        Ok(RunReport::finish(paths, Some(batch_id), started))
    }

    /// Revert a batch, newest migration first
    pub async fn execute_batch_down(&mut self, migrations: &[Migration]) -> MigrateResult<RunReport> {
        ensure_single_batch(migrations)?;

        let mut ordered = migrations.to_vec();
        ordered.sort_by(|a, b| b.migrated_at().cmp(a.migrated_at()));
        self.execute_migrations_down(&ordered).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::executor::tests::{executor, migration, RecordingConnection};
    use tempfile::TempDir;

    #[test]
    fn test_ensure_single_batch() {
        assert_eq!(
            ensure_single_batch(&[migration(Some("b1"), "a"), migration(Some("b1"), "b")]).unwrap(),
            "b1"
        );
        assert!(ensure_single_batch(&[]).is_err());
        assert!(ensure_single_batch(&[migration(None, "a")]).is_err());
        assert!(matches!(
            ensure_single_batch(&[migration(Some("b1"), "a"), migration(Some("b2"), "b")]),
            Err(MigrateError::BatchIntegrity(_))
        ));
    }

    #[test]
    fn test_concatenated_down_terminates_statements() {
        let first = Migration::new(Some("b1".to_string()), "CREATE TABLE a (id INT)", "DROP TABLE a -- bye", "a.sql")
            .unwrap();
        let second = Migration::new(Some("b1".to_string()), "CREATE TABLE b (id INT)", "DROP TABLE b;", "b.sql")
            .unwrap();

        assert_eq!(
            concatenated_down(&[first, second]),
            "DROP TABLE a -- bye\n;\nDROP TABLE b;"
        );
    }

    #[tokio::test]
    async fn test_mixed_batches_touch_nothing() {
        let temp = TempDir::new().unwrap();
        let connection = RecordingConnection::default();
        let mut executor = executor(&temp, connection.clone()).await;

        let recorded = [
            migration(Some("B1"), "a"),
            migration(Some("B1"), "b"),
            migration(Some("B2"), "c"),
        ];
        executor
            .repository()
            .save(&recorded)
            .await
            .unwrap()
            .commit()
            .await
            .unwrap();

        let result = executor.execute_batch_down(&recorded).await;
        assert!(matches!(result, Err(MigrateError::BatchIntegrity(_))));
        assert_eq!(*connection.calls.lock().unwrap(), 0);
        assert_eq!(executor.repository().list().await.unwrap().len(), 3);

        let result = executor.execute_migrations_down(&[]).await;
        assert!(matches!(result, Err(MigrateError::BatchIntegrity(_))));
        assert_eq!(*connection.calls.lock().unwrap(), 0);
        executor.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_down_runs_once_newest_first() {
        let temp = TempDir::new().unwrap();
        let connection = RecordingConnection::default();
        let mut executor = executor(&temp, connection.clone()).await;

        let batch = [migration(Some("B1"), "a"), migration(Some("B1"), "b")];
        executor.execute_migrations_up(&batch).await.unwrap();
        let recorded = executor.repository().list().await.unwrap();

        let report = executor.execute_batch_down(&recorded).await.unwrap();
        assert_eq!(report.count(), 2);
        assert_eq!(report.batch_id.as_deref(), Some("B1"));
        assert!(executor.repository().list().await.unwrap().is_empty());

        let executed = connection.executed.lock().unwrap();
        assert_eq!(executed.len(), 3);
        assert_eq!(executed[2], "DROP TABLE b\n;\nDROP TABLE a\n;");
        drop(executed);
        executor.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_down_keeps_the_batch() {
        let temp = TempDir::new().unwrap();
        let connection = RecordingConnection {
            fail_on: Some("DROP TABLE b".to_string()),
            ..Default::default()
        };
        let mut executor = executor(&temp, connection).await;

        let batch = [migration(Some("B1"), "a"), migration(Some("B1"), "b")];
        executor.execute_migrations_up(&batch).await.unwrap();
        let recorded = executor.repository().list().await.unwrap();

        assert!(executor.execute_batch_down(&recorded).await.is_err());
        assert_eq!(executor.repository().list().await.unwrap().len(), 2);
        executor.close().await.unwrap();
    }
}
