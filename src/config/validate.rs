// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::warn;

use crate::config::model::{ConfigFile, RawConfigFile, parse_duration};
use crate::errors::{Result, TaskmendError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskmendError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        lint_task_graph(&raw);
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_global_config(cfg)?;
    validate_guardrails(cfg)?;
    validate_task_dependencies(cfg)?;
    Ok(())
}

/// Error unless the config declares at least one `[task.<id>]`.
///
/// Only required when no plan file supplies the tasks.
pub fn ensure_has_tasks(cfg: &ConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(TaskmendError::ConfigError(
            "config must contain at least one [task.<id>] section (or pass --plan)".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_attempts == 0 {
        return Err(TaskmendError::ConfigError(
            "[config].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.config.workers == 0 {
        return Err(TaskmendError::ConfigError(
            "[config].workers must be >= 1 (got 0)".to_string(),
        ));
    }

    if let Some(timeout) = &cfg.config.task_timeout {
        parse_duration(timeout).map_err(|e| {
            TaskmendError::ConfigError(format!("[config].task_timeout '{timeout}': {e}"))
        })?;
    }

    Ok(())
}

fn validate_guardrails(cfg: &RawConfigFile) -> Result<()> {
    cfg.guardrails
        .build()
        .map(|_| ())
        .map_err(|e| TaskmendError::ConfigError(format!("[guardrails].forbidden: {e}")))
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.after.iter().any(|dep| dep == name) {
            return Err(TaskmendError::ConfigError(format!(
                "task '{}' cannot depend on itself in `after`",
                name
            )));
        }
    }
    Ok(())
}

/// Warn about dependency problems that will surface as a stall at run time.
///
/// Unknown ids and cycles are allowed at load: other nodes may still be
/// inserted during the run, and the stall report gives the full picture.
fn lint_task_graph(cfg: &RawConfigFile) {
    // Edge direction: dep -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                warn!(task = %name, dependency = %dep, "`after` names a task that is not configured");
            }
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        warn!(
            task = %cycle.node_id(),
            "cycle detected in task graph; the run will stall"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::load_from_str;
    use crate::types::CorrectionPolicy;

    fn validate(toml: &str) -> Result<ConfigFile> {
        ConfigFile::try_from(load_from_str(toml)?)
    }

    #[test]
    fn defaults_apply() {
        let cfg = validate("[task.a]\npayload = \"echo a\"\n").unwrap();
        assert_eq!(cfg.config.max_attempts, 3);
        assert_eq!(cfg.config.correction_policy, CorrectionPolicy::FixTask);
        assert_eq!(cfg.config.max_fix_depth, 1);
        assert_eq!(cfg.config.workers, 4);
        assert_eq!(cfg.retrieval.top_k, 3);
        assert!(cfg.task_timeout().is_none());
        assert!(!cfg.guardrails().is_empty());
    }

    #[test]
    fn cmd_is_an_alias_for_payload() {
        let cfg = validate("[task.a]\ncmd = \"echo a\"\n").unwrap();
        assert_eq!(cfg.task["a"].payload, serde_json::json!("echo a"));
    }

    #[test]
    fn rejects_zero_attempts_and_workers() {
        let err = validate("[config]\nmax_attempts = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
        assert!(validate("[config]\nworkers = 0\n").is_err());
    }

    #[test]
    fn rejects_bad_timeout_and_patterns() {
        assert!(validate("[config]\ntask_timeout = \"soon\"\n").is_err());
        assert!(validate("[guardrails]\nforbidden = [\"(\"]\n").is_err());
    }

    #[test]
    fn rejects_self_dependency_but_allows_cycles() {
        let err = validate("[task.a]\npayload = \"x\"\nafter = [\"a\"]\n").unwrap_err();
        assert!(matches!(err, TaskmendError::ConfigError(_)));

        let cfg = validate(
            "[task.a]\npayload = \"x\"\nafter = [\"b\"]\n[task.b]\npayload = \"y\"\nafter = [\"a\"]\n",
        )
        .unwrap();
        assert_eq!(cfg.task.len(), 2);
    }

    #[test]
    fn unknown_policy_is_a_toml_error() {
        let err = validate("[config]\ncorrection_policy = \"retry_forever\"\n").unwrap_err();
        assert!(matches!(err, TaskmendError::TomlError(_)));
    }

    #[test]
    fn empty_config_needs_a_plan() {
        let cfg = validate("").unwrap();
        assert!(ensure_has_tasks(&cfg).is_err());
    }
}
