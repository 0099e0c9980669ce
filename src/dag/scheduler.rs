use std::collections::HashMap;

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::dag::graph::{SharedGraph, TaskGraph};
use crate::dag::scheduler_step::{ReadyBatch, SchedulerStep};
use crate::dag::stall::StallReport;
use crate::dag::task_info::{BlockedNode, ReadyTask, TaskRunState};
use crate::engine::{NodeId, Payload, TaskResult};
use crate::errors::{Result, TaskmendError};

/// Prefix of the node id inserted to repair an exhausted node.
pub const FIX_PREFIX: &str = "fix_";

/// Scheduler holds the shared graph plus fix-task bookkeeping.
///
/// It is responsible for:
/// - taking ready snapshots for dispatch (one per cycle)
/// - applying completions, including forwarding a fix node's result to the
///   node it repairs
/// - inserting fix nodes and withholding the repaired node until its fix
///   completes
/// - describing a stall when nothing can run
#[derive(Debug)]
pub struct Scheduler {
    graph: SharedGraph,
    /// Delegated node -> fix node standing in for it.
    delegations: HashMap<NodeId, NodeId>,
    /// Fix node -> node it repairs.
    fix_origins: HashMap<NodeId, NodeId>,
    /// Number of completed dispatch cycles that had work.
    cycle: u64,
}

impl Scheduler {
    pub fn new(graph: SharedGraph) -> Self {
        Self {
            graph,
            delegations: HashMap::new(),
            fix_origins: HashMap::new(),
            cycle: 0,
        }
    }

    pub fn from_graph(graph: TaskGraph) -> Self {
        Self::new(SharedGraph::new(graph))
    }

    /// Handle to the underlying graph; clones share state.
    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Insert a node (idempotent). Visible from the next snapshot on.
    pub fn insert(&self, id: impl Into<NodeId>, payload: Payload, dependencies: Vec<NodeId>) -> bool {
        self.graph.insert(id, payload, dependencies)
    }

    pub fn is_complete(&self) -> bool {
        self.graph.is_complete()
    }

    /// Snapshot the nodes that can run now.
    ///
    /// Nodes delegated to a pending fix are left out even though their own
    /// dependencies are met.
    pub fn next_batch(&mut self) -> ReadyBatch {
        let graph = self.graph.read();

        let ready: Vec<NodeId> = graph
            .ready_set()
            .into_iter()
            .filter(|id| !self.delegations.contains_key(id))
            .collect();

        if ready.is_empty() {
            return ReadyBatch {
                cycle: self.cycle,
                tasks: Vec::new(),
            };
        }

        self.cycle += 1;
        let cycle = self.cycle;

        let tasks = ready
            .into_iter()
            .filter_map(|id| {
                let node = graph.node(&id)?;
                let mut dependency_results = Map::new();
                for dep in &node.dependencies {
                    let value = graph.result_of(dep).cloned().unwrap_or(Value::Null);
                    dependency_results.insert(dep.clone(), value);
                }
                Some(ReadyTask {
                    id,
                    payload: node.payload.clone(),
                    dependency_results,
                    cycle,
                })
            })
            .collect::<Vec<_>>();

        debug!(
            cycle,
            ready = ?tasks.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            "scheduler: ready snapshot taken"
        );

        ReadyBatch { cycle, tasks }
    }

    /// Complete a node with `result`.
    ///
    /// If the node is a fix node, the node it repairs is completed with the
    /// same result (transitively, for fixes of fixes).
    pub fn complete(&mut self, id: &str, result: TaskResult) -> Result<SchedulerStep> {
        let mut graph = self.graph.write();
        let mut newly_completed = Vec::new();

        if graph.complete(id, result.clone())? {
            newly_completed.push(id.to_string());
        }

        let mut current = id.to_string();
        while let Some(original) = self.fix_origins.get(&current).cloned() {
            self.delegations.remove(&original);
            if graph.complete(&original, result.clone())? {
                info!(
                    task = %original,
                    fix = %current,
                    "fix completed; forwarding its result to the repaired node"
                );
                newly_completed.push(original.clone());
            }
            current = original;
        }

        Ok(SchedulerStep {
            newly_completed,
            inserted: Vec::new(),
            graph_complete: graph.is_complete(),
        })
    }

    /// Insert `fix_<id>` for an exhausted node and withhold the node until the
    /// fix completes.
    ///
    /// The fix depends on the same upstream nodes as the original and its
    /// payload carries the original payload together with the failure trail.
    /// Calling this again for an already delegated node is a no-op.
    pub fn delegate_to_fix(
        &mut self,
        id: &str,
        last_output: &Value,
        feedback_trail: &[String],
    ) -> Result<SchedulerStep> {
        if let Some(existing) = self.delegations.get(id) {
            debug!(task = %id, fix = %existing, "node already delegated to a fix");
            return Ok(SchedulerStep {
                graph_complete: self.graph.is_complete(),
                ..SchedulerStep::default()
            });
        }

        let (payload, dependencies) = {
            let graph = self.graph.read();
            let node = graph
                .node(id)
                .ok_or_else(|| TaskmendError::UnknownNode(id.to_string()))?;
            (node.payload.clone(), node.dependencies.clone())
        };

        let fix_id = self.free_fix_id(id);
        let fix_payload = json!({
            "fix_for": id,
            "original_payload": payload,
            "last_output": last_output,
            "feedback": feedback_trail,
        });

        let inserted = self.attach_fix(id, &fix_id, fix_payload, dependencies);
        info!(task = %id, fix = %fix_id, "inserted fix task for exhausted node");

        Ok(SchedulerStep {
            newly_completed: Vec::new(),
            inserted: if inserted { vec![fix_id] } else { Vec::new() },
            graph_complete: false,
        })
    }

    /// Re-create a fix delegation from persisted state.
    pub fn restore_fix(
        &mut self,
        fix_id: &str,
        original: &str,
        payload: Payload,
        dependencies: Vec<NodeId>,
    ) -> Result<()> {
        let original_done = {
            let graph = self.graph.read();
            if !graph.contains(original) {
                return Err(TaskmendError::UnknownNode(original.to_string()));
            }
            graph.is_node_completed(original)
        };

        if self.graph.read().contains(fix_id) && self.original_of(fix_id) != Some(original) {
            warn!(
                task = %original,
                fix = %fix_id,
                "persisted fix id is taken by another node; not restoring it"
            );
            return Ok(());
        }

        if original_done {
            // The fix already delivered; still re-insert it so its own
            // persisted completion can be re-applied.
            self.graph.insert(fix_id, payload, dependencies);
            self.fix_origins.insert(fix_id.to_string(), original.to_string());
        } else {
            self.attach_fix(original, fix_id, payload, dependencies);
        }
        Ok(())
    }

    /// `fix_<id>`, or `fix_<id>_2`, `fix_<id>_3`, ... when a node with that
    /// id already exists. An existing node is never reused as a fix.
    fn free_fix_id(&self, id: &str) -> NodeId {
        let graph = self.graph.read();
        let base = fix_id_for(id);
        if !graph.contains(&base) {
            return base;
        }
        let fresh = (2u64..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !graph.contains(candidate))
            .unwrap_or(base);
        debug!(task = %id, fix = %fresh, "fix id taken; using a fresh one");
        fresh
    }

    fn attach_fix(&mut self, original: &str, fix_id: &str, payload: Payload, deps: Vec<NodeId>) -> bool {
        let inserted = self.graph.insert(fix_id, payload, deps);
        if !inserted {
            warn!(task = %original, fix = %fix_id, "fix node id already present; reusing it");
        }
        self.delegations.insert(original.to_string(), fix_id.to_string());
        self.fix_origins.insert(fix_id.to_string(), original.to_string());
        inserted
    }

    /// Fix node currently standing in for `id`, if any.
    pub fn fix_of(&self, id: &str) -> Option<&str> {
        self.delegations.get(id).map(String::as_str)
    }

    /// Node repaired by the fix node `id`, if it is one.
    pub fn original_of(&self, id: &str) -> Option<&str> {
        self.fix_origins.get(id).map(String::as_str)
    }

    /// How many fix generations separate `id` from a planned node
    /// (0 for planned nodes, 1 for `fix_<id>`, ...).
    pub fn fix_depth(&self, id: &str) -> u32 {
        let mut depth = 0;
        let mut current = id;
        while let Some(original) = self.fix_origins.get(current) {
            depth += 1;
            current = original;
        }
        depth
    }

    /// Read-only view of a node's state, `None` for unknown ids.
    pub fn run_state_of(&self, id: &str) -> Option<TaskRunState> {
        let graph = self.graph.read();
        let node = graph.node(id)?;

        let state = if node.is_completed() {
            TaskRunState::Completed
        } else if self.delegations.contains_key(id) {
            TaskRunState::AwaitingFix
        } else if node.dependencies.iter().all(|d| graph.is_node_completed(d)) {
            TaskRunState::Ready
        } else {
            TaskRunState::Waiting
        };
        Some(state)
    }

    /// Describe every incomplete node and what holds it back.
    pub fn stall_report(&self) -> StallReport {
        let graph = self.graph.read();
        let mut blocked: HashMap<NodeId, BlockedNode> = graph
            .blocked()
            .into_iter()
            .map(|b| (b.id.clone(), b))
            .collect();

        let ordered: Vec<BlockedNode> = graph
            .nodes()
            .filter(|n| !n.is_completed())
            .filter_map(|n| {
                let mut entry = blocked.remove(&n.id).unwrap_or_else(|| BlockedNode {
                    id: n.id.clone(),
                    incomplete: Vec::new(),
                    missing: Vec::new(),
                    awaiting_fix: None,
                });
                entry.awaiting_fix = self.delegations.get(&n.id).cloned();
                let holds_back = entry.awaiting_fix.is_some()
                    || !entry.incomplete.is_empty()
                    || !entry.missing.is_empty();
                holds_back.then_some(entry)
            })
            .collect();

        StallReport::new(&graph, ordered)
    }
}

/// Id of the fix node for `id`.
pub fn fix_id_for(id: &str) -> NodeId {
    format!("{FIX_PREFIX}{id}")
}
