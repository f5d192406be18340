use ezmig_core::MigrateConfig;
use ezmig_engine::{ConnectionFactory, MigrateError, MigrateResult, RunReport, SeedExecutor, SeedHandler};
use tracing::warn;

/// Run every seed file against the target database. Seeds are not tracked.
pub async fn run(config: &MigrateConfig) -> MigrateResult<RunReport> {
    config.validate()?;

    let seeds = SeedHandler::from_config(config).load_seeds().await?;
    if seeds.is_empty() {
        return Err(MigrateError::NothingToDo("No seeds to run".to_string()));
    }

    let mut executor = SeedExecutor::new(ConnectionFactory::from_config(config)?);
    let result = executor.execute(&seeds).await;
    match executor.close().await {
        Ok(()) => result,
        Err(e) if result.is_ok() => Err(e),
        Err(e) => {
            warn!("Failed to close the target connection: {}", e);
            result
        }
    }
}
