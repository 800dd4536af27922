use anyhow::Result;
use tally_core::config::TallyConfig;
use tally_core::store::Store;

/// Execute `qt init`: open the store, which creates the database file and
/// migrates the schema to the latest version.
pub fn run(config: &TallyConfig) -> Result<()> {
    let store = Store::open_with_timeout(&config.store_path, config.busy_timeout())?;
    drop(store);
    println!("store ready at {}", config.store_path.display());
    Ok(())
}
