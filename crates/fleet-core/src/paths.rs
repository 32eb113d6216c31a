use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const FLEET_DIR: &str = ".fleet";
pub const CONFIG_FILE: &str = ".fleet/config.yaml";
pub const REGISTRY_FILE: &str = ".fleet/registry.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn fleet_dir(root: &Path) -> PathBuf {
    root.join(FLEET_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn registry_path(root: &Path) -> PathBuf {
    root.join(REGISTRY_FILE)
}
