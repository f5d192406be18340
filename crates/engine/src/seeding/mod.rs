//! Seeds: data statements kept apart from migrations
//!
//! Seed files live in their own directory, are run in file name order and are
//! never tracked. They may only hold data statements.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::{MigrateError, MigrateResult};
use crate::migrations::definitions::RunReport;
use crate::migrations::parser::{has_ddl, scaffold_file, strip_comments};
use ezmig_core::MigrateConfig;

const SEED_TEMPLATE: &str = "-- write the seed statements here\n";

/// A loaded seed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub path: String,
    pub sql: String,
}

/// Strip comments and collapse whitespace
pub fn normalize(sql: &str) -> String {
    strip_comments(sql)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads and scaffolds seed files
#[derive(Debug, Clone)]
pub struct SeedHandler {
    seeds_dir: PathBuf,
}

impl SeedHandler {
    pub fn new(seeds_dir: impl Into<PathBuf>) -> Self {
        Self {
            seeds_dir: seeds_dir.into(),
        }
    }

    pub fn from_config(config: &MigrateConfig) -> Self {
        Self::new(&config.seeds_path)
    }

    pub fn seeds_dir(&self) -> &Path {
        &self.seeds_dir
    }

    /// Sorted `.sql` file names, creating the seeds directory if absent
    pub async fn seed_files(&self) -> MigrateResult<Vec<String>> {
        fs::create_dir_all(&self.seeds_dir).await?;

        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.seeds_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file()
                && path.extension().map_or(false, |ext| ext == "sql")
            {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    files.push(name.to_string());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Every non-blank seed, normalized. Seeds holding DDL are rejected.
    pub async fn load_seeds(&self) -> MigrateResult<Vec<Seed>> {
        let mut seeds = Vec::new();

        for name in self.seed_files().await? {
            let path = self.seeds_dir.join(&name);
            let shown = path.display().to_string();
            let sql = normalize(&fs::read_to_string(&path).await?);

            if sql.is_empty() {
                debug!("Skipping empty seed {}", shown);
                continue;
            }
            if has_ddl(&sql) {
                return Err(MigrateError::format(
                    shown,
                    "seeds may only change data, move schema statements to a migration",
                ));
            }

            seeds.push(Seed { path: shown, sql });
        }

        Ok(seeds)
    }

    pub async fn make_seed_file(&self, name: &str) -> MigrateResult<PathBuf> {
        let path = scaffold_file(&self.seeds_dir, name, SEED_TEMPLATE).await?;
        info!("Created seed file {}", path.display());
        Ok(path)
    }
}

/// Runs seeds against the target database
pub struct SeedExecutor {
    connection: Box<dyn Connection>,
}

impl SeedExecutor {
    pub fn new(connection: Box<dyn Connection>) -> Self {
        Self { connection }
    }

    pub async fn execute(&mut self, seeds: &[Seed]) -> MigrateResult<RunReport> {
        let started = Instant::now();
        let mut paths = Vec::with_capacity(seeds.len());

        self.connection.test_connectivity().await?;
        for seed in seeds {
            self.connection.initialize(Some(&seed.path), None).await?;
            self.connection.run_sql(&seed.sql).await?;
            info!("Seed executed: {}", seed.path);
            paths.push(seed.path.clone());
        }

        Ok(RunReport::finish(paths, None, started))
    }

    pub async fn close(&mut self) -> MigrateResult<()> {
        self.connection.close().await
    }
}
