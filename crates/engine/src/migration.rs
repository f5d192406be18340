//! The Migration entity
//!
//! A [`Migration`] is one versioned schema change. It is created either by the
//! file parser before it runs or rebuilt from a tracker row after it ran, and
//! it is never modified afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

use crate::error::{MigrateError, MigrateResult};

static LAST_MIGRATED_AT: AtomicI64 = AtomicI64::new(0);

/// Current UTC time with microsecond precision, strictly increasing across
/// calls within the process.
pub fn precise_now() -> String {
    let now = Utc::now().timestamp_micros();
    let mut last = LAST_MIGRATED_AT.load(Ordering::Relaxed);
    let next = loop {
        let candidate = now.max(last + 1);
        match LAST_MIGRATED_AT.compare_exchange_weak(
            last,
            candidate,
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => break candidate,
            Err(actual) => last = actual,
        }
    };

    DateTime::<Utc>::from_timestamp_micros(next)
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
}

/// Fresh identifier shared by the migrations of one batch
pub fn new_batch_id() -> String {
    Uuid::new_v4().to_string()
}

/// Plain snapshot of a migration, handed to status and listing callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationDetails {
    pub batch_id: Option<String>,
    pub migrated_at: String,
    pub up: String,
    pub down: String,
    pub path: String,
}

/// Represents one database migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    batch_id: Option<String>,
    migrated_at: String,
    up: String,
    down: String,
    path: String,
}

impl Migration {
    /// Create a migration that has not run yet, stamping it with a fresh `migrated_at`
    pub fn new(
        batch_id: Option<String>,
        up: impl Into<String>,
        down: impl Into<String>,
        path: impl Into<String>,
    ) -> MigrateResult<Self> {
        Self::build(batch_id, precise_now(), up.into(), down.into(), path.into())
    }

    /// Rebuild a migration from a tracker row
    pub fn from_record(
        batch_id: Option<String>,
        migrated_at: impl Into<String>,
        up: impl Into<String>,
        down: impl Into<String>,
        path: impl Into<String>,
    ) -> MigrateResult<Self> {
        let migrated_at = migrated_at.into();
        if migrated_at.trim().is_empty() {
            return Err(MigrateError::Tracker(
                "tracker row has an empty migrated_at".to_string(),
            ));
        }
        Self::build(batch_id, migrated_at, up.into(), down.into(), path.into())
    }

    fn build(
        batch_id: Option<String>,
        migrated_at: String,
        up: String,
        down: String,
        path: String,
    ) -> MigrateResult<Self> {
        if path.trim().is_empty() {
            return Err(MigrateError::format("<unknown>", "migration path must be specified"));
        }
        if up.trim().is_empty() {
            return Err(MigrateError::format(&path, "SQL for the up migration is missing"));
        }
        if down.trim().is_empty() {
            return Err(MigrateError::format(&path, "SQL for the down migration is missing"));
        }

        Ok(Self {
            batch_id,
            migrated_at,
            up,
            down,
            path,
        })
    }

    /// Same migration tagged with `batch_id`, with a fresh timestamp
    pub fn in_batch(&self, batch_id: &str) -> Self {
        Self {
            batch_id: Some(batch_id.to_string()),
            migrated_at: precise_now(),
            up: self.up.clone(),
            down: self.down.clone(),
            path: self.path.clone(),
        }
    }

    pub fn batch_id(&self) -> Option<&str> {
        self.batch_id.as_deref()
    }

    pub fn migrated_at(&self) -> &str {
        &self.migrated_at
    }

    pub fn up(&self) -> &str {
        &self.up
    }

    pub fn down(&self) -> &str {
        &self.down
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// File name part of the path, used to navigate between migration files
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .unwrap_or(&self.path)
    }

    pub fn details(&self) -> MigrationDetails {
        MigrationDetails {
            batch_id: self.batch_id.clone(),
            migrated_at: self.migrated_at.clone(),
            up: self.up.clone(),
            down: self.down.clone(),
            path: self.path.clone(),
        }
    }
}
