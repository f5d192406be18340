//! Read-only commands: status and list

use ezmig_engine::{migration_status, MigrateResult, Migration, MigrationStatus, MigrationStatusEntry};

use crate::session::Session;

/// Every migration file next to what the tracker recorded for it
pub async fn status(session: &Session) -> MigrateResult<Vec<MigrationStatusEntry>> {
    let files = session.parser.all_migrations().await?;
    let applied = session.executor.repository().list().await?;
    Ok(migration_status(&files, &applied))
}

/// Applied migrations, oldest first
pub async fn list(session: &Session) -> MigrateResult<Vec<Migration>> {
    session.executor.repository().list_ordered().await
}

pub fn print_status(entries: &[MigrationStatusEntry]) {
    if entries.is_empty() {
        println!("No migration files found");
        return;
    }

    for entry in entries {
        match &entry.status {
            MigrationStatus::Pending => println!("{} {}", entry.status.symbol(), entry.file_name),
            MigrationStatus::Applied { migrated_at, .. } => {
                println!("{} {}  ({})", entry.status.symbol(), entry.file_name, migrated_at)
            }
            MigrationStatus::Modified { migrated_at, .. } => println!(
                "{} {}  ({}, file changed since it was applied)",
                entry.status.symbol(),
                entry.file_name,
                migrated_at
            ),
        }
    }

    let pending = entries.iter().filter(|e| !e.status.is_applied()).count();
    println!("{} applied, {} pending", entries.len() - pending, pending);
}

pub fn print_list(migrations: &[Migration], json: bool) -> MigrateResult<()> {
    if json {
        let details: Vec<_> = migrations.iter().map(Migration::details).collect();
        let rendered = serde_json::to_string_pretty(&details).map_err(std::io::Error::from)?;
        println!("{}", rendered);
        return Ok(());
    }

    if migrations.is_empty() {
        println!("No migrations have been applied");
    }
    for migration in migrations {
        println!(
            "{}  {}  {}",
            migration.migrated_at(),
            migration.batch_id().unwrap_or("-"),
            migration.path()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::migrate;
    use crate::session::tests::{sqlite_config, write_migration};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_status_marks_pending_applied_and_modified() {
        let temp = TempDir::new().unwrap();
        let config = sqlite_config(&temp);
        write_migration(&config.migrations_path, "001-users.sql", "users");
        write_migration(&config.migrations_path, "002-posts.sql", "posts");

        let mut session = Session::open(&config).await.unwrap();
        migrate::migrate(&mut session).await.unwrap();
        write_migration(&config.migrations_path, "002-posts.sql", "articles");
        write_migration(&config.migrations_path, "003-tags.sql", "tags");

        let entries = status(&session).await.unwrap();
        let symbols: Vec<&str> = entries.iter().map(|e| e.status.symbol()).collect();
        assert_eq!(symbols, vec!["✔", "⚠", "✘"]);

        let listed = list(&session).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].file_name(), "001-users.sql");
        session.close(Ok(())).await.unwrap();
    }
}
