use ezmig_core::MigrateConfig;
use ezmig_engine::{MigrateResult, MigrationFileParser, SeedHandler};

pub async fn migration(config: &MigrateConfig, name: &str) -> MigrateResult<()> {
    let path = MigrationFileParser::from_config(config)
        .make_migration_file(name)
        .await?;
    println!("Created migration: {}", path.display());
    Ok(())
}

pub async fn seed(config: &MigrateConfig, name: &str) -> MigrateResult<()> {
    let path = SeedHandler::from_config(config).make_seed_file(name).await?;
    println!("Created seed: {}", path.display());
    Ok(())
}
