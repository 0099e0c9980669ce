// src/plan/mod.rs

//! Turning planner output or config tasks into nodes to insert.
//!
//! A plan is a JSON array:
//!
//! ```json
//! [
//!   {"id": "setup", "description": "mkdir -p build", "deps": []},
//!   {"id": "build", "description": "make", "deps": ["setup"]}
//! ]
//! ```
//!
//! `description` becomes the node payload. Numeric ids are accepted and
//! used as strings. A surrounding Markdown code fence is tolerated since
//! planners tend to emit one.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::config::ConfigFile;
use crate::engine::{NodeId, Payload};
use crate::errors::{Result, TaskmendError};

/// A node the planning phase inserts before execution starts.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTask {
    pub id: NodeId,
    pub payload: Payload,
    pub dependencies: Vec<NodeId>,
}

impl PlannedTask {
    pub fn new(id: impl Into<NodeId>, payload: Payload, dependencies: Vec<NodeId>) -> Self {
        Self {
            id: id.into(),
            payload,
            dependencies,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPlanEntry {
    id: Value,
    #[serde(default)]
    description: Option<String>,
    /// Structured payload; wins over `description` when both are given.
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    deps: Vec<Value>,
}

/// Parse planner JSON into planned tasks, keeping plan order.
///
/// A repeated id keeps its first entry.
pub fn parse_plan_json(text: &str) -> Result<Vec<PlannedTask>> {
    let body = strip_code_fence(text);
    let entries: Vec<RawPlanEntry> = serde_json::from_str(body)
        .map_err(|e| TaskmendError::PlanError(format!("plan must be a JSON array of tasks: {e}")))?;

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let id = id_string(&entry.id)
            .ok_or_else(|| TaskmendError::PlanError(format!("task #{index} has no usable id")))?;

        let payload = match (entry.payload, entry.description) {
            (Some(payload), _) => payload,
            (None, Some(description)) => Value::String(description),
            (None, None) => {
                return Err(TaskmendError::PlanError(format!(
                    "task '{id}' needs a description or payload"
                )));
            }
        };

        let dependencies = entry
            .deps
            .iter()
            .map(|d| {
                id_string(d).ok_or_else(|| {
                    TaskmendError::PlanError(format!("task '{id}' has an invalid dependency {d}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if !seen.insert(id.clone()) {
            warn!(task = %id, "duplicate task id in plan; keeping the first entry");
            continue;
        }
        tasks.push(PlannedTask::new(id, payload, dependencies));
    }

    Ok(tasks)
}

/// Tasks from the `[task.<id>]` sections of a config, in id order.
pub fn from_config(cfg: &ConfigFile) -> Vec<PlannedTask> {
    cfg.task
        .iter()
        .map(|(id, task)| PlannedTask::new(id.clone(), task.payload.clone(), task.after.clone()))
        .collect()
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") up to the first newline.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
