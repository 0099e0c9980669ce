// src/config/mod.rs

//! Configuration loading and validation for taskmend.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it and lint the task graph (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str, load_or_default};
pub use model::{
    ConfigFile, ConfigSection, GuardrailSection, RawConfigFile, RetrievalSection, TaskConfig,
    parse_duration,
};
pub use validate::ensure_has_tasks;
