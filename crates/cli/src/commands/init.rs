use ezmig_core::{MigrateConfig, CONFIG_FILE};
use ezmig_engine::MigrateResult;

/// Write the default configuration file unless one is already there
pub fn run() -> MigrateResult<()> {
    if MigrateConfig::write_default(CONFIG_FILE)? {
        println!("Created {}", CONFIG_FILE);
    } else {
        println!("{} already exists, nothing to do", CONFIG_FILE);
    }
    Ok(())
}
