use anyhow::Context;
use fleet_core::{config::FleetConfig, paths, registry::TenantRegistry};
use std::path::Path;

/// Create `.fleet/` with a default config and an empty registry. Existing
/// files are left alone.
pub fn run(root: &Path) -> anyhow::Result<()> {
    let config_path = paths::config_path(root);
    if config_path.exists() {
        println!("Config already present: {}", config_path.display());
    } else {
        FleetConfig::default()
            .save(root)
            .context("failed to write default config")?;
        println!("Wrote {}", config_path.display());
    }
    TenantRegistry::open(&paths::registry_path(root)).context("failed to create registry")?;
    println!("Registry ready: {}", paths::registry_path(root).display());
    Ok(())
}
