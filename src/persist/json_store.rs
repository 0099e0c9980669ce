// src/persist/json_store.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::fs::{FileSystem, RealFileSystem};
use crate::persist::{RunState, StateStore};

/// Stores run state as pretty JSON at a fixed path.
///
/// Writes go to `<path>.tmp` first and are renamed over the target, so a
/// crash mid-write leaves the previous state intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_fs(path, Arc::new(RealFileSystem))
    }

    pub fn with_fs(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl StateStore for JsonFileStore {
    fn save(&self, state: &RunState) -> Result<()> {
        debug!(
            path = %self.path.display(),
            completed = state.results.len(),
            "writing run state"
        );
        let mut buf = serde_json::to_string_pretty(state)?;
        buf.push('\n');

        let tmp = self.tmp_path();
        self.fs
            .write(&tmp, buf.as_bytes())
            .with_context(|| format!("write temp run state {}", tmp.display()))?;
        self.fs
            .rename(&tmp, &self.path)
            .with_context(|| format!("replace run state {}", self.path.display()))
    }

    fn load(&self) -> Result<Option<RunState>> {
        if !self.fs.exists(&self.path) {
            debug!(path = %self.path.display(), "no run state to resume from");
            return Ok(None);
        }
        let contents = self.fs.read_to_string(&self.path)?;
        let state: RunState = serde_json::from_str(&contents)
            .with_context(|| format!("parse run state {}", self.path.display()))?;
        debug!(
            path = %self.path.display(),
            completed = state.results.len(),
            "run state loaded"
        );
        Ok(Some(state))
    }
}
