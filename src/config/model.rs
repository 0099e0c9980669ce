// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::correction::DEFAULT_MAX_ATTEMPTS;
use crate::guardrails::{DEFAULT_FORBIDDEN, Guardrails};
use crate::types::CorrectionPolicy;

/// Raw configuration as read from a TOML file (before validation).
///
/// ```toml
/// [config]
/// max_attempts = 3
/// correction_policy = "fix_task"
/// workers = 4
///
/// [guardrails]
/// forbidden = ["rm\\s+-rf"]
///
/// [retrieval]
/// files = ["README.md"]
///
/// [task.build]
/// payload = "make"
/// after = ["setup"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub guardrails: GuardrailSection,

    #[serde(default)]
    pub retrieval: RetrievalSection,

    /// All tasks from `[task.<id>]`, keyed by node id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub guardrails: GuardrailSection,
    pub retrieval: RetrievalSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            guardrails: raw.guardrails,
            retrieval: raw.retrieval,
            task: raw.task,
        }
    }

    /// Parsed `[config].task_timeout`.
    pub fn task_timeout(&self) -> Option<Duration> {
        self.config
            .task_timeout
            .as_deref()
            .and_then(|s| parse_duration(s).ok())
    }

    /// Compiled `[guardrails]` patterns.
    pub fn guardrails(&self) -> Guardrails {
        // Patterns were compiled once during validation.
        self.guardrails.build().unwrap_or_default()
    }
}

/// `[config]` section: run-wide knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Attempts per node before the correction loop gives up (>= 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// What to do with exhausted nodes.
    #[serde(default)]
    pub correction_policy: CorrectionPolicy,

    /// How many generations of fix nodes may be stacked on one planned node.
    #[serde(default = "default_max_fix_depth")]
    pub max_fix_depth: u32,

    /// Maximum concurrently running tasks (>= 1).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Where run state is persisted.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Optional per-attempt timeout for shell tasks, e.g. `"30s"`.
    #[serde(default)]
    pub task_timeout: Option<String>,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_max_fix_depth() -> u32 {
    1
}

fn default_workers() -> usize {
    4
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".taskmend/run_state.json")
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            correction_policy: CorrectionPolicy::default(),
            max_fix_depth: default_max_fix_depth(),
            workers: default_workers(),
            state_file: default_state_file(),
            task_timeout: None,
        }
    }
}

/// `[guardrails]` section.
///
/// Leaving `forbidden` out keeps the built-in patterns; `forbidden = []`
/// turns guardrails off.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GuardrailSection {
    #[serde(default)]
    pub forbidden: Option<Vec<String>>,
}

impl GuardrailSection {
    pub fn patterns(&self) -> Vec<String> {
        match &self.forbidden {
            Some(list) => list.clone(),
            None => DEFAULT_FORBIDDEN.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn build(&self) -> Result<Guardrails, regex::Error> {
        Guardrails::new(self.patterns())
    }
}

/// `[retrieval]` section: files indexed for supporting context.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSection {
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Snippets attached to each task.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    3
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            top_k: default_top_k(),
        }
    }
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Opaque payload handed to the executor; a string is a shell command
    /// for the default executor.
    #[serde(alias = "cmd")]
    pub payload: Value,

    /// Ids this task waits for.
    #[serde(default)]
    pub after: Vec<String>,
}

/// Parse durations like `"500ms"`, `"30s"`, `"5m"`, `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        unit => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_parse() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 2m "), Ok(Duration::from_secs(120)));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn guardrail_patterns_default_when_absent() {
        assert_eq!(GuardrailSection::default().patterns().len(), DEFAULT_FORBIDDEN.len());
        let off = GuardrailSection {
            forbidden: Some(vec![]),
        };
        assert!(off.build().unwrap().is_empty());
    }
}
