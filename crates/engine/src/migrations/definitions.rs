//! Migration Definitions - Core types shared by the parser, executor and use cases

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

use crate::migration::Migration;

/// Marker opening and closing the up section of a migration file
pub const UP_MARKER: &str = "-- ez-migration-up";
/// Marker opening and closing the down section of a migration file
pub const DOWN_MARKER: &str = "-- ez-migration-down";

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationDirection {
    /// Apply the migration (run UP statements)
    Up,
    /// Rollback the migration (run DOWN statements)
    Down,
}

impl std::fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "up"),
            MigrationDirection::Down => write!(f, "down"),
        }
    }
}

/// Result of an executor operation
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Paths of the migrations that were applied or reverted
    pub paths: Vec<String>,
    /// Batch the migrations belonged to
    pub batch_id: Option<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl RunReport {
    pub(crate) fn finish(paths: Vec<String>, batch_id: Option<String>, started: Instant) -> Self {
        Self {
            paths,
            batch_id,
            execution_time_ms: started.elapsed().as_millis(),
        }
    }

    pub fn count(&self) -> usize {
        self.paths.len()
    }

    pub fn merge(&mut self, other: RunReport) {
        self.paths.extend(other.paths);
        self.execution_time_ms += other.execution_time_ms;
        if other.batch_id.is_some() {
            self.batch_id = other.batch_id;
        }
    }
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStatus {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied {
        batch_id: Option<String>,
        migrated_at: String,
    },
    /// Applied, but the file's up SQL no longer matches what was run
    Modified {
        batch_id: Option<String>,
        migrated_at: String,
    },
}

impl MigrationStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            MigrationStatus::Pending => "✘",
            MigrationStatus::Applied { .. } => "✔",
            MigrationStatus::Modified { .. } => "⚠",
        }
    }

    pub fn is_applied(&self) -> bool {
        !matches!(self, MigrationStatus::Pending)
    }
}

/// Status line for one migration file
#[derive(Debug, Clone)]
pub struct MigrationStatusEntry {
    pub file_name: String,
    pub status: MigrationStatus,
}

/// Pair every migration file with what the tracker recorded for it.
///
/// Files are matched to tracker rows by file name, so moving the migrations
/// directory does not turn applied migrations into pending ones.
pub fn migration_status(files: &[Migration], applied: &[Migration]) -> Vec<MigrationStatusEntry> {
    let recorded: HashMap<&str, &Migration> =
        applied.iter().map(|m| (m.file_name(), m)).collect();

    files
        .iter()
        .map(|file| {
            let status = match recorded.get(file.file_name()) {
                None => MigrationStatus::Pending,
                Some(row) if row.up().trim() == file.up().trim() => MigrationStatus::Applied {
                    batch_id: row.batch_id().map(str::to_string),
                    migrated_at: row.migrated_at().to_string(),
                },
                Some(row) => MigrationStatus::Modified {
                    batch_id: row.batch_id().map(str::to_string),
                    migrated_at: row.migrated_at().to_string(),
                },
            };

            MigrationStatusEntry {
                file_name: file.file_name().to_string(),
                status,
            }
        })
        .collect()
}
