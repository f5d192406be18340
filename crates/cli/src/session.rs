//! Everything a tracked command needs, opened once and always closed

use ezmig_core::MigrateConfig;
use ezmig_engine::{ConnectionFactory, MigrateResult, MigrationExecutor, MigrationFileParser, Repository};
use tracing::{debug, warn};

pub struct Session {
    pub parser: MigrationFileParser,
    pub executor: MigrationExecutor,
}

impl Session {
    /// Validate the configuration, then open the target and an initialized tracker
    pub async fn open(config: &MigrateConfig) -> MigrateResult<Self> {
        config.validate()?;

        let connection = ConnectionFactory::from_config(config)?;
        let mut repository = Repository::from_config(config)?;
        if let Err(e) = repository.init().await {
            if let Err(close) = repository.close().await {
                warn!("Failed to close the tracker: {}", close);
            }
            return Err(e);
        }
        debug!("Tracker ready ({})", repository.dialect());

        Ok(Self {
            parser: MigrationFileParser::from_config(config),
            executor: MigrationExecutor::new(connection, repository),
        })
    }

    /// Close the target and the tracker, then hand back `result`.
    ///
    /// A close failure only surfaces when the command itself succeeded.
    pub async fn close<T>(mut self, result: MigrateResult<T>) -> MigrateResult<T> {
        let closed = self.executor.close().await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close)) => {
                warn!("Failed to close connections: {}", close);
                Err(e)
            }
        }
    }
}
