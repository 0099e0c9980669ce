// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a config file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    debug!(path = %path.display(), "loading config");
    let contents = fs::read_to_string(path)?;
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<RawConfigFile> {
    Ok(toml::from_str(contents)?)
}

/// Load a configuration file and validate it.
///
/// This is the entry point for the rest of the application: defaults are
/// applied by `serde`, then [`ConfigFile::try_from`] checks attempt and
/// worker bounds, guardrail patterns, timeouts and self-dependencies.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw = load_from_path(&path)?;
    ConfigFile::try_from(raw)
}

/// Like [`load_and_validate`], but a missing file yields the defaults.
///
/// Used when tasks come from a plan file and the config is optional.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    if path.exists() {
        load_and_validate(path)
    } else {
        debug!(path = %path.display(), "config not found; using defaults");
        ConfigFile::try_from(RawConfigFile::default())
    }
}

/// `Taskmend.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskmend.toml")
}
