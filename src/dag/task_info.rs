// src/dag/task_info.rs

//! Task nodes and the per-dispatch view handed to workers.

use serde_json::{Map, Value};

use crate::engine::{NodeId, Payload, TaskResult};

/// A single task in the graph.
///
/// `completed` and `result` are only ever set together, once, by
/// [`TaskGraph::complete`](crate::dag::TaskGraph::complete).
#[derive(Debug, Clone, PartialEq)]
pub struct TaskNode {
    pub id: NodeId,
    pub payload: Payload,
    /// Direct dependencies, deduplicated, in declaration order.
    pub dependencies: Vec<NodeId>,
    completed: bool,
    result: Option<TaskResult>,
}

impl TaskNode {
    pub fn new(id: NodeId, payload: Payload, dependencies: Vec<NodeId>) -> Self {
        let mut deps: Vec<NodeId> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        Self {
            id,
            payload,
            dependencies: deps,
            completed: false,
            result: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    /// Returns `false` (and leaves the node untouched) if it was already
    /// completed.
    pub(super) fn mark_completed(&mut self, result: TaskResult) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        self.result = Some(result);
        true
    }
}

/// Public, read-only view of where a node stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// Incomplete, some dependency is unmet.
    Waiting,
    /// Incomplete with every dependency complete.
    Ready,
    /// Incomplete, withheld until its fix node completes.
    AwaitingFix,
    Completed,
}

/// A node the scheduler wants executed in the current cycle.
///
/// This is an owned snapshot: later graph mutations do not affect it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyTask {
    pub id: NodeId,
    pub payload: Payload,
    /// Results of the direct dependencies, keyed by dependency id.
    pub dependency_results: Map<String, Value>,
    /// Cycle in which this task was dispatched.
    pub cycle: u64,
}

/// Dependencies of an incomplete node that are holding it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedNode {
    pub id: NodeId,
    /// Present in the graph but not completed.
    pub incomplete: Vec<NodeId>,
    /// Never inserted.
    pub missing: Vec<NodeId>,
    /// Fix node this one was delegated to, if any.
    pub awaiting_fix: Option<NodeId>,
}

impl BlockedNode {
    pub fn unmet(&self) -> impl Iterator<Item = &NodeId> {
        self.incomplete.iter().chain(self.missing.iter())
    }
}
