//! Backward commands: down, rollback and reset

use ezmig_engine::{MigrateError, MigrateResult, RunReport};
use tracing::info;

use super::migrate;
use crate::session::Session;

/// Revert the most recently applied migration
pub async fn down(session: &mut Session) -> MigrateResult<RunReport> {
    let last = session
        .executor
        .repository()
        .get_last_migration_done()
        .await?
        .ok_or_else(|| MigrateError::NothingToDo("No applied migration to revert".to_string()))?;

    session.executor.execute_single_migration_down(&last).await
}

/// Revert the most recent batch as a whole
pub async fn rollback(session: &mut Session) -> MigrateResult<RunReport> {
    let batch = session
        .executor
        .repository()
        .get_last_batch_migration_done()
        .await?
        .ok_or_else(|| MigrateError::NothingToDo("No applied batch to roll back".to_string()))?;

    session.executor.execute_batch_down(&batch).await
}

/// Roll back batch by batch until nothing is recorded, then migrate again.
///
/// The second report is `None` when there are no migration files to apply.
pub async fn reset(session: &mut Session) -> MigrateResult<(RunReport, Option<RunReport>)> {
    let mut reverted = RunReport::default();
    let mut batches = 0;

    while let Some(batch) = session.executor.repository().get_last_batch_migration_done().await? {
        reverted.merge(session.executor.execute_batch_down(&batch).await?);
        batches += 1;
    }
    reverted.batch_id = None;
    info!("Reverted {} batch(es)", batches);

    match migrate::migrate(session).await {
        Ok(applied) => Ok((reverted, Some(applied))),
        Err(MigrateError::NothingToDo(_)) => Ok((reverted, None)),
        Err(e) => Err(e),
    }
}
