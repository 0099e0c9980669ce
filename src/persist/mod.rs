// src/persist/mod.rs

//! Run state persistence.
//!
//! The coordinator is the only writer. State is saved after every applied
//! outcome so a crashed run resumes from its last completion.
//!
//! On disk:
//!
//! ```json
//! {
//!   "task_status": { "setup": true, "build": false },
//!   "results": { "setup": { "exit_code": 0, "stdout": "", "stderr": "" } },
//!   "fix_tasks": [ { "id": "fix_build", "original": "build", "payload": {}, "dependencies": ["setup"] } ]
//! }
//! ```
//!
//! `results` keeps completion order; `fix_tasks` is omitted when empty.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dag::TaskGraph;
use crate::engine::{NodeId, Payload, TaskResult};

pub mod json_store;

pub use json_store::JsonFileStore;

static MISSING_RESULT: Value = Value::Null;

/// A fix node inserted at run time, kept so resume can re-insert it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixTaskRecord {
    pub id: NodeId,
    pub original: NodeId,
    pub payload: Payload,
    #[serde(default)]
    pub dependencies: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default)]
    pub task_status: BTreeMap<NodeId, bool>,

    /// Completed node -> result, in completion order.
    #[serde(default)]
    pub results: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fix_tasks: Vec<FixTaskRecord>,
}

impl RunState {
    /// Record a completion. A node already recorded keeps its first result.
    pub fn record_completion(&mut self, id: &str, result: TaskResult) {
        self.task_status.insert(id.to_string(), true);
        if !self.results.contains_key(id) {
            self.results.insert(id.to_string(), result);
        }
    }

    pub fn record_fix(&mut self, record: FixTaskRecord) {
        if !self.fix_tasks.iter().any(|f| f.id == record.id) {
            self.fix_tasks.push(record);
        }
    }

    /// Refresh `task_status` so it lists every node in `graph`.
    pub fn sync_status(&mut self, graph: &TaskGraph) {
        for node in graph.nodes() {
            self.task_status.insert(node.id.clone(), node.is_completed());
        }
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.task_status.get(id).copied().unwrap_or(false)
    }

    /// Every node flagged completed, with its result.
    ///
    /// Recorded results come first, in completion order. A node flagged
    /// completed without a recorded result follows with a `null` result, so
    /// the flags alone decide what counts as done.
    pub fn completed_results(&self) -> impl Iterator<Item = (&str, &Value)> {
        let recorded = self
            .results
            .iter()
            .filter(|(id, _)| self.is_completed(id))
            .map(|(id, result)| (id.as_str(), result));
        let flagged_only = self
            .task_status
            .iter()
            .filter(|(id, done)| **done && !self.results.contains_key(id.as_str()))
            .map(|(id, _)| (id.as_str(), &MISSING_RESULT));
        recorded.chain(flagged_only)
    }
}

/// Where run state lives between runs.
pub trait StateStore: Send + Sync {
    fn save(&self, state: &RunState) -> Result<()>;

    /// `None` when nothing was saved yet.
    fn load(&self) -> Result<Option<RunState>>;
}

/// Keeps the state in memory; used by tests and `--dry-run`-style callers.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<RunState>>,
    saves: Mutex<usize>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `state`, as if a previous run saved it.
    pub fn with_state(state: RunState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: Mutex::new(0),
        }
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Option<RunState> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, state: &RunState) -> Result<()> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<RunState>> {
        Ok(self.snapshot())
    }
}
