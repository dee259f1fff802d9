//! Config file loading

use anyhow::{Context, Result};
use placerank_ranking::EngineConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming a config file when none is passed explicitly
pub const CONFIG_ENV: &str = "PLACERANK_CONFIG";

/// Explicit path first, then `PLACERANK_CONFIG`
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

/// Load and validate the engine config. Without a file, defaults apply.
pub fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    let config = match config_path(explicit) {
        Some(path) => {
            let config = read_config(&path)?;
            info!("Loaded config from {:?}", path);
            config
        }
        None => EngineConfig::default(),
    };
    config.validate().context("invalid engine config")?;
    Ok(config)
}

pub fn read_config(path: &Path) -> Result<EngineConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("failed to parse config file {}", path.display()))
}

pub fn parse_config(raw: &str) -> Result<EngineConfig> {
    Ok(toml::from_str(raw)?)
}
