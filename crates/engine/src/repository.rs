//! Repository: the tracker as seen by use cases and the executor

use ezmig_core::{Dialect, MigrateConfig};

use crate::error::MigrateResult;
use crate::migration::Migration;
use crate::tracker::{Persistency, TrackerFactory, TrackerTransaction};

/// Thin façade over a [`Persistency`] implementation
pub struct Repository {
    persistency: Box<dyn Persistency>,
}

impl Repository {
    pub fn new(persistency: impl Persistency + 'static) -> Self {
        Self {
            persistency: Box::new(persistency),
        }
    }

    /// Repository over the tracker described by `config`
    pub fn from_config(config: &MigrateConfig) -> MigrateResult<Self> {
        Ok(Self::new(TrackerFactory::from_config(config)?))
    }

    pub fn dialect(&self) -> Dialect {
        self.persistency.dialect()
    }

    pub async fn init(&mut self) -> MigrateResult<()> {
        self.persistency.init().await
    }

    pub async fn save(&self, migrations: &[Migration]) -> MigrateResult<TrackerTransaction> {
        self.persistency.save(migrations).await
    }

    pub async fn remove_migration(&self, migration: &Migration) -> MigrateResult<TrackerTransaction> {
        self.persistency.remove_migration(migration).await
    }

    pub async fn remove_migrations(&self, migrations: &[Migration]) -> MigrateResult<TrackerTransaction> {
        self.persistency.remove_migrations(migrations).await
    }

    pub async fn list(&self) -> MigrateResult<Vec<Migration>> {
        self.persistency.list().await
    }

    /// Recorded migrations, oldest first
    pub async fn list_ordered(&self) -> MigrateResult<Vec<Migration>> {
        let mut migrations = self.persistency.list().await?;
        migrations.sort_by(|a, b| a.migrated_at().cmp(b.migrated_at()));
        Ok(migrations)
    }

    pub async fn get_last_migration_done(&self) -> MigrateResult<Option<Migration>> {
        self.persistency.get_last_migration_done().await
    }

    pub async fn get_last_batch_migration_done(&self) -> MigrateResult<Option<Vec<Migration>>> {
        self.persistency.get_last_batch_migration_done().await
    }

    pub async fn close(&mut self) -> MigrateResult<()> {
        self.persistency.close().await
    }
}
