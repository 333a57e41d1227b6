use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{InventoryError, Result};
use crate::lazy::{ASSOCIATION_NAMES, MAX_NESTING_DEPTH};

/// Name of the configuration file stored inside the `.inventory_refresh` directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Name of the hidden directory holding resolver settings.
pub const CONFIG_DIR: &str = ".inventory_refresh";

/// Settings for [`crate::lazy::LazyResolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Schema version of the configuration.
    pub version: u32,
    /// Deepest nesting of lazy values inside a reference that flattening
    /// accepts.
    pub max_nesting_depth: usize,
    /// Attribute names treated as associations on every collection, on top
    /// of `parent` and `genealogy_parent`.
    pub association_names: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            version: 1,
            max_nesting_depth: MAX_NESTING_DEPTH,
            association_names: ASSOCIATION_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Returns the path to the `.inventory_refresh` directory within the given root.
pub fn get_config_dir(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR)
}

/// Returns the path to the configuration file within the config directory.
pub fn get_config_path(root: &Path) -> PathBuf {
    get_config_dir(root).join(CONFIG_FILENAME)
}

/// Loads the configuration from disk, or the defaults when there is no
/// configuration file.
pub fn load_config(root: &Path) -> Result<ResolverConfig> {
    let config_path = get_config_path(root);

    if !config_path.exists() {
        return Ok(ResolverConfig::default());
    }

    let contents = fs::read_to_string(&config_path).map_err(|e| InventoryError::Config {
        message: format!(
            "failed to read config file '{}': {}",
            config_path.display(),
            e
        ),
    })?;

    let config: ResolverConfig =
        serde_json::from_str(&contents).map_err(|e| InventoryError::Config {
            message: format!(
                "failed to parse config file '{}': {}",
                config_path.display(),
                e
            ),
        })?;

    tracing::debug!(path = %config_path.display(), "loaded resolver config");
    Ok(config)
}

/// Saves the configuration to disk using an atomic write.
///
/// Writes to a temporary file first and then renames it to the final location,
/// ensuring that a partial write never corrupts the configuration.
pub fn save_config(root: &Path, config: &ResolverConfig) -> Result<()> {
    let config_dir = get_config_dir(root);
    fs::create_dir_all(&config_dir).map_err(|e| InventoryError::Config {
        message: format!(
            "failed to create config directory '{}': {}",
            config_dir.display(),
            e
        ),
    })?;

    let config_path = get_config_path(root);
    let tmp_path = config_path.with_extension("tmp");

    let json = serde_json::to_string_pretty(config).map_err(|e| InventoryError::Config {
        message: format!("failed to serialize config: {}", e),
    })?;

    fs::write(&tmp_path, &json).map_err(|e| InventoryError::Config {
        message: format!(
            "failed to write temporary config file '{}': {}",
            tmp_path.display(),
            e
        ),
    })?;

    fs::rename(&tmp_path, &config_path).map_err(|e| InventoryError::Config {
        message: format!(
            "failed to rename temporary config file '{}' to '{}': {}",
            tmp_path.display(),
            config_path.display(),
            e
        ),
    })?;

    Ok(())
}

/// Writes the default configuration under `root` and returns its path.
///
/// An existing file is only replaced when `force` is set.
pub fn init_config(root: &Path, force: bool) -> Result<PathBuf> {
    let config_path = get_config_path(root);
    if config_path.exists() && !force {
        return Err(InventoryError::Config {
            message: format!(
                "config file '{}' already exists (use --force to overwrite)",
                config_path.display()
            ),
        });
    }

    save_config(root, &ResolverConfig::default())?;
    tracing::info!(path = %config_path.display(), "wrote default resolver config");
    Ok(config_path)
}
