//! # ezmig-engine: migration tracking and execution
//!
//! Parses `<timestamp>-<name>.sql` migration files, applies and reverts them
//! against a target database and records every applied file in a tracker
//! table. The tracker can live in SQLite, MySQL or PostgreSQL and its table
//! shape is verified before anything runs.
//!
//! The [`MigrationExecutor`] stages the tracker write in an open transaction
//! before the migration SQL runs and only commits it once the SQL succeeded,
//! so the tracker never records a migration that did not happen.

pub mod connection;
pub mod error;
pub mod migration;
pub mod migrations;
pub mod repository;
pub mod seeding;
pub mod tracker;
pub mod translator;

pub use connection::*;
pub use error::*;
pub use migration::*;
pub use migrations::*;
pub use repository::*;
pub use seeding::*;
pub use tracker::*;
pub use translator::*;
