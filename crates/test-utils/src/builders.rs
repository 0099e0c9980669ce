#![allow(dead_code)]

use serde_json::{Value, json};
use taskmend::config::{ConfigFile, RawConfigFile, TaskConfig};
use taskmend::plan::PlannedTask;
use taskmend::types::CorrectionPolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.config.config.max_attempts = n;
        self
    }

    pub fn with_policy(mut self, policy: CorrectionPolicy) -> Self {
        self.config.config.correction_policy = policy;
        self
    }

    pub fn with_workers(mut self, n: usize) -> Self {
        self.config.config.workers = n;
        self
    }

    pub fn with_forbidden(mut self, patterns: &[&str]) -> Self {
        self.config.guardrails.forbidden = Some(patterns.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    /// The raw config, for tests of validation itself.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(payload: impl Into<Value>) -> Self {
        Self {
            task: TaskConfig {
                payload: payload.into(),
                after: Vec::new(),
            },
        }
    }

    pub fn after(mut self, deps: &[&str]) -> Self {
        self.task.after = deps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Builder for planned tasks (and the equivalent planner JSON).
#[derive(Default)]
pub struct PlanBuilder {
    tasks: Vec<PlannedTask>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task whose payload is its id.
    pub fn task(self, id: &str, deps: &[&str]) -> Self {
        self.task_with(id, json!(id), deps)
    }

    pub fn task_with(mut self, id: &str, payload: Value, deps: &[&str]) -> Self {
        self.tasks.push(PlannedTask::new(
            id,
            payload,
            deps.iter().map(|d| d.to_string()).collect(),
        ));
        self
    }

    pub fn build(self) -> Vec<PlannedTask> {
        self.tasks
    }

    /// Planner-style JSON (`[{"id", "description", "deps"}]`).
    pub fn to_plan_json(&self) -> String {
        let entries: Vec<Value> = self
            .tasks
            .iter()
            .map(|t| {
                let description = match &t.payload {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                json!({"id": t.id, "description": description, "deps": t.dependencies})
            })
            .collect();
        Value::Array(entries).to_string()
    }
}
