//! Configuration loading for zipnum

use anyhow::{Context, Result};
use std::path::Path;
use zipnum_storage::{ClusterConfig, LocationSource};

/// Load a cluster config from a TOML file, or the defaults when no file is given.
///
/// A relative mapping file path is taken relative to the config file.
pub fn load_config(path: Option<&Path>) -> Result<ClusterConfig> {
    let Some(path) = path else {
        return Ok(ClusterConfig::default());
    };

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let mut config: ClusterConfig = toml::from_str(&contents)
        .with_context(|| format!("Invalid config file {}", path.display()))?;

    if let Some(LocationSource::MapFile(map)) = config.shard_index_loc.as_mut() {
        if map.is_relative() {
            if let Some(base) = path.parent() {
                *map = base.join(&*map);
            }
        }
    }

    Ok(config)
}
