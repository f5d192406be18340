//! Error types for migration tracking and execution
//!
//! Every failure surfaces to the caller as a [`MigrateError`]; the variant
//! tells at which stage the operation stopped and therefore what state the
//! target database and the tracker were left in.

use ezmig_core::ConfigError;
use thiserror::Error;

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Bad dialect or malformed configuration, raised before any database I/O
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The live tracker table does not match the expected shape
    #[error("Tracker schema mismatch on column '{column}': {reason}")]
    SchemaMismatch { column: String, reason: String },

    /// Malformed migration or seed file
    #[error("Invalid migration file {path}: {reason}")]
    Format { path: String, reason: String },

    /// A rollback was requested over migrations of more than one batch
    #[error("Batch integrity error: {0}")]
    BatchIntegrity(String),

    /// The target database rejected the migration SQL
    #[error("SQL execution failed for {path}: {message}")]
    SqlExecution { path: String, message: String },

    /// Reading or writing the tracker store failed
    #[error("Tracker error: {0}")]
    Tracker(String),

    /// The target database cannot be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// A navigation reference names no migration file
    #[error("Migration file not found: {0}")]
    MigrationNotFound(String),

    /// There is no migration to apply or to revert
    #[error("{0}")]
    NothingToDo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    pub fn format(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn schema_mismatch(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub fn sql_execution(path: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::SqlExecution {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Wrap a tracker-side driver error with context
    pub fn tracker(context: &str, source: impl std::fmt::Display) -> Self {
        Self::Tracker(format!("{}: {}", context, source))
    }

    /// Whether the error was raised before any database I/O happened
    pub fn is_fatal_before_io(&self) -> bool {
        matches!(
            self,
            MigrateError::Configuration(_)
                | MigrateError::Format { .. }
                | MigrateError::BatchIntegrity(_)
                | MigrateError::MigrationNotFound(_)
        )
    }
}

impl From<ConfigError> for MigrateError {
    fn from(err: ConfigError) -> Self {
        MigrateError::Configuration(err.to_string())
    }
}
