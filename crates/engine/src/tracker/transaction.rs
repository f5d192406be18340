//! Transaction Management
//!
//! [`TrackerTransaction`] is the handle a tracker write returns. The rows it
//! staged only become visible after [`TrackerTransaction::commit`].

use sqlx::{MySql, Postgres, Sqlite, Transaction as SqlxTransaction};
use tracing::{debug, warn};

use crate::error::{MigrateError, MigrateResult};

pub(crate) enum Inner {
    Sqlite(SqlxTransaction<'static, Sqlite>),
    MySql(SqlxTransaction<'static, MySql>),
    Postgres(SqlxTransaction<'static, Postgres>),
}

/// Open tracker transaction holding staged inserts or deletes
pub struct TrackerTransaction {
    inner: Option<Inner>,
    operation: String,
}

impl TrackerTransaction {
    pub(crate) fn new(inner: Inner, operation: impl Into<String>) -> Self {
        Self {
            inner: Some(inner),
            operation: operation.into(),
        }
    }

    /// Commit the transaction
    pub async fn commit(mut self) -> MigrateResult<()> {
        let inner = self.take()?;
        debug!("Committing tracker transaction: {}", self.operation);
        let result = match inner {
            Inner::Sqlite(tx) => tx.commit().await,
            Inner::MySql(tx) => tx.commit().await,
            Inner::Postgres(tx) => tx.commit().await,
        };
        result.map_err(|e| MigrateError::tracker("Failed to commit tracker transaction", e))
    }

    /// Rollback the transaction
    pub async fn rollback(mut self) -> MigrateResult<()> {
        let inner = self.take()?;
        debug!("Rolling back tracker transaction: {}", self.operation);
        let result = match inner {
            Inner::Sqlite(tx) => tx.rollback().await,
            Inner::MySql(tx) => tx.rollback().await,
            Inner::Postgres(tx) => tx.rollback().await,
        };
        result.map_err(|e| MigrateError::tracker("Failed to rollback tracker transaction", e))
    }

    fn take(&mut self) -> MigrateResult<Inner> {
        self.inner.take().ok_or_else(|| {
            MigrateError::Tracker("Transaction has already been consumed".to_string())
        })
    }
}

impl std::fmt::Debug for TrackerTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerTransaction")
            .field("operation", &self.operation)
            .field("active", &self.inner.is_some())
            .finish()
    }
}

impl Drop for TrackerTransaction {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            warn!(
                "Tracker transaction '{}' dropped without commit or rollback, rolling back",
                self.operation
            );
            // sqlx rolls the transaction back when it is dropped
            drop(inner);
        }
    }
}
