// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] for a
/// config that is safe to wire into a `Leader`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_str(&contents)
}

/// Deserialize TOML text without validating it.
pub fn parse_str(contents: &str) -> Result<RawConfigFile> {
    let config: RawConfigFile = toml::from_str(contents)?;
    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `JobGraph.toml` in the current working directory, unless
/// `JOBGRAPH_CONFIG` points elsewhere.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("JOBGRAPH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("JobGraph.toml"))
}
