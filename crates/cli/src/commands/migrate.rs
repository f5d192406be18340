//! Forward commands: migrate, up and redo

use ezmig_engine::{MigrateError, MigrateResult, Migration, RunReport};

use super::rollback;
use crate::session::Session;

/// Migration files after the last applied one, all sharing one fresh batch
pub async fn pending(session: &Session) -> MigrateResult<Vec<Migration>> {
    match session.executor.repository().get_last_migration_done().await? {
        Some(last) => session.parser.all_next_to(last.file_name()).await,
        None => session.parser.all_migrations().await,
    }
}

/// Apply every pending migration as one batch
pub async fn migrate(session: &mut Session) -> MigrateResult<RunReport> {
    let pending = pending(session).await?;
    if pending.is_empty() {
        return Err(MigrateError::NothingToDo(
            "No pending migrations, the database is up to date".to_string(),
        ));
    }

    session.executor.execute_migrations_up(&pending).await
}

/// Apply the single migration following the last applied one
pub async fn up(session: &mut Session) -> MigrateResult<RunReport> {
    let next = match session.executor.repository().get_last_migration_done().await? {
        Some(last) => session.parser.next(last.file_name()).await?,
        None => match session.parser.list_files().await?.first() {
            Some(first) => Some(session.parser.make_migration_from_file(first).await?),
            None => None,
        },
    };

    match next {
        Some(migration) => session.executor.execute_single_migration_up(&migration).await,
        None => Err(MigrateError::NothingToDo(
            "No pending migration to apply".to_string(),
        )),
    }
}

/// Revert the last migration and apply it again
pub async fn redo(session: &mut Session) -> MigrateResult<(RunReport, RunReport)> {
    let reverted = rollback::down(session).await?;
    let applied = up(session).await?;
    Ok((reverted, applied))
}
