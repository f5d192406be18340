use ezmig_core::ConnectionSettings;
use ezmig_engine::{
    migration_status, ConnectionFactory, MigrateError, MigrationExecutor, MigrationFileParser,
    Repository, SqliteTracker, DOWN_MARKER, UP_MARKER,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Row;
use std::path::Path;
use tempfile::TempDir;

fn write_migration(dir: &Path, name: &str, up: &str, down: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join(name),
        format!("{UP_MARKER}\n{up}\n{UP_MARKER}\n\n{DOWN_MARKER}\n{down}\n{DOWN_MARKER}\n"),
    )
    .unwrap();
}

struct Workspace {
    _temp: TempDir,
    parser: MigrationFileParser,
    target: std::path::PathBuf,
    tracker: std::path::PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let migrations = temp.path().join("migrations");
        write_migration(
            &migrations,
            "001-init.sql",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
            "DROP TABLE users;",
        );
        write_migration(
            &migrations,
            "002-add.sql",
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER);\nCREATE INDEX posts_user ON posts (user_id);",
            "DROP INDEX posts_user;\nDROP TABLE posts;",
        );

        Self {
            parser: MigrationFileParser::new(&migrations),
            target: temp.path().join("database.sqlite"),
            tracker: temp.path().join("migrations").join("tracker.db"),
            _temp: temp,
        }
    }

    async fn executor(&self) -> MigrationExecutor {
        let connection = ConnectionFactory::create(&ConnectionSettings::sqlite(&self.target)).unwrap();
        let mut repository = Repository::new(SqliteTracker::new(&self.tracker));
        repository.init().await.unwrap();
        MigrationExecutor::new(connection, repository)
    }

    async fn tables(&self) -> Vec<String> {
        let pool = SqlitePoolOptions::new()
            .connect(&format!("sqlite://{}", self.target.display()))
            .await
            .unwrap();
        let rows = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('users', 'posts') ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        pool.close().await;
        rows.iter().map(|row| row.get::<String, _>("name")).collect()
    }
}

#[tokio::test]
async fn test_migrate_status_rollback_cycle() {
    let workspace = Workspace::new();
    let mut executor = workspace.executor().await;

    let migrations = workspace.parser.all_migrations().await.unwrap();
    let report = executor.execute_migrations_up(&migrations).await.unwrap();
    assert_eq!(report.count(), 2);
    assert_eq!(workspace.tables().await, vec!["posts", "users"]);

    let applied = executor.repository().list().await.unwrap();
    assert_eq!(applied.len(), 2);
    assert_eq!(applied[0].batch_id(), applied[1].batch_id());

    let status = migration_status(&migrations, &applied);
    assert!(status.iter().all(|entry| entry.status.symbol() == "✔"));

    let batch = executor
        .repository()
        .get_last_batch_migration_done()
        .await
        .unwrap()
        .unwrap();
    let report = executor.execute_batch_down(&batch).await.unwrap();
    assert_eq!(report.count(), 2);
    assert!(workspace.tables().await.is_empty());

    let applied = executor.repository().list().await.unwrap();
    let status = migration_status(&migrations, &applied);
    assert!(status.iter().all(|entry| entry.status.symbol() == "✘"));

    executor.close().await.unwrap();
}

#[tokio::test]
async fn test_parsed_and_persisted_migrations_match() {
    let workspace = Workspace::new();
    let mut executor = workspace.executor().await;

    let parsed = workspace.parser.make_migration_from_file("001-init.sql").await.unwrap();
    executor.execute_single_migration_up(&parsed).await.unwrap();

    let persisted = executor
        .repository()
        .get_last_migration_done()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(persisted.up(), parsed.up());
    assert_eq!(persisted.down(), parsed.down());
    assert_eq!(persisted.path(), parsed.path());

    let next = workspace.parser.all_next_to(persisted.file_name()).await.unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].file_name(), "002-add.sql");

    executor.close().await.unwrap();
}

#[tokio::test]
async fn test_failing_migration_is_not_recorded() {
    let workspace = Workspace::new();
    write_migration(
        workspace.parser.migrations_dir(),
        "003-broken.sql",
        "CREATE TABLE broken (id INTEGER;",
        "DROP TABLE broken;",
    );
    let mut executor = workspace.executor().await;

    let migrations = workspace.parser.all_migrations().await.unwrap();
    let result = executor.execute_migrations_up(&migrations).await;
    assert!(matches!(result, Err(MigrateError::SqlExecution { .. })));

    let applied = executor.repository().list().await.unwrap();
    let mut names: Vec<&str> = applied.iter().map(|m| m.file_name()).collect();
    names.sort();
    assert_eq!(names, vec!["001-init.sql", "002-add.sql"]);

    executor.close().await.unwrap();
}

#[tokio::test]
async fn test_tracker_init_is_repeatable_across_runs() {
    let workspace = Workspace::new();

    for _ in 0..3 {
        let mut executor = workspace.executor().await;
        assert!(executor.repository().list().await.unwrap().is_empty());
        executor.close().await.unwrap();
    }
}
