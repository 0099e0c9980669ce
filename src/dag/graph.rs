// src/dag/graph.rs

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, trace};

use crate::dag::task_info::{BlockedNode, TaskNode};
use crate::engine::{NodeId, Payload, TaskResult};
use crate::errors::{Result, TaskmendError};

/// In-memory task graph keyed by node id.
///
/// Besides the nodes themselves we keep a reverse index (`dependents`) that
/// is updated on every insert, including entries for dependency ids that
/// have not been inserted yet. Acyclicity is not checked here; a cycle shows
/// up later as a stall.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    nodes: HashMap<NodeId, TaskNode>,
    /// Insertion order, used for deterministic iteration.
    order: Vec<NodeId>,
    dependents: HashMap<NodeId, Vec<NodeId>>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node if its id is not present yet.
    ///
    /// Returns `true` if the node was created. Inserting an existing id is a
    /// no-op: payload and dependencies of the first insert are kept.
    pub fn insert(&mut self, id: impl Into<NodeId>, payload: Payload, dependencies: Vec<NodeId>) -> bool {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            debug!(task = %id, "insert of existing node ignored");
            return false;
        }

        let node = TaskNode::new(id.clone(), payload, dependencies);
        for dep in &node.dependencies {
            self.dependents.entry(dep.clone()).or_default().push(id.clone());
        }

        trace!(task = %id, deps = ?node.dependencies, "node inserted");
        self.order.push(id.clone());
        self.nodes.insert(id, node);
        true
    }

    /// Ids of incomplete nodes whose dependencies are all present and
    /// completed, in insertion order.
    pub fn ready_set(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|node| !node.is_completed() && self.deps_satisfied(node))
            .map(|node| node.id.clone())
            .collect()
    }

    /// Mark a node completed with `result`.
    ///
    /// Returns `Ok(false)` if it was already completed (the first result is
    /// kept) and [`TaskmendError::UnknownNode`] if the id was never inserted.
    pub fn complete(&mut self, id: &str, result: TaskResult) -> Result<bool> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| TaskmendError::UnknownNode(id.to_string()))?;

        let changed = node.mark_completed(result);
        if !changed {
            debug!(task = %id, "node already completed; keeping first result");
        }
        Ok(changed)
    }

    /// True iff every known node is completed. An empty graph is complete.
    pub fn is_complete(&self) -> bool {
        self.nodes.values().all(TaskNode::is_completed)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub fn result_of(&self, id: &str) -> Option<&TaskResult> {
        self.nodes.get(id).and_then(TaskNode::result)
    }

    pub fn is_node_completed(&self, id: &str) -> bool {
        self.nodes.get(id).is_some_and(TaskNode::is_completed)
    }

    /// Immediate dependencies of a node (empty for unknown ids).
    pub fn dependencies_of(&self, id: &str) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of an id, whether or not the id itself exists.
    pub fn dependents_of(&self, id: &str) -> &[NodeId] {
        self.dependents
            .get(id)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Incomplete nodes that are not ready, with the dependencies holding
    /// them back.
    pub fn blocked(&self) -> Vec<BlockedNode> {
        self.nodes()
            .filter(|node| !node.is_completed() && !self.deps_satisfied(node))
            .map(|node| {
                let mut incomplete = Vec::new();
                let mut missing = Vec::new();
                for dep in &node.dependencies {
                    match self.nodes.get(dep) {
                        None => missing.push(dep.clone()),
                        Some(d) if !d.is_completed() => incomplete.push(dep.clone()),
                        Some(_) => {}
                    }
                }
                BlockedNode {
                    id: node.id.clone(),
                    incomplete,
                    missing,
                    awaiting_fix: None,
                }
            })
            .collect()
    }

    fn deps_satisfied(&self, node: &TaskNode) -> bool {
        node.dependencies
            .iter()
            .all(|dep| self.is_node_completed(dep))
    }
}

/// Shared handle to a [`TaskGraph`].
///
/// Every mutation takes the write lock, so a node and its reverse-index
/// entries appear atomically to readers computing readiness. Clones share
/// the same graph, which lets collaborators insert nodes while a batch runs.
#[derive(Debug, Clone, Default)]
pub struct SharedGraph {
    inner: Arc<RwLock<TaskGraph>>,
}

impl SharedGraph {
    pub fn new(graph: TaskGraph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    // A panic while holding the lock cannot leave a node half-inserted, so
    // a poisoned lock still guards a consistent graph.
    pub fn read(&self) -> RwLockReadGuard<'_, TaskGraph> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, TaskGraph> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, id: impl Into<NodeId>, payload: Payload, dependencies: Vec<NodeId>) -> bool {
        self.write().insert(id, payload, dependencies)
    }

    pub fn complete(&self, id: &str, result: TaskResult) -> Result<bool> {
        self.write().complete(id, result)
    }

    pub fn ready_set(&self) -> Vec<NodeId> {
        self.read().ready_set()
    }

    pub fn is_complete(&self) -> bool {
        self.read().is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chain() -> TaskGraph {
        let mut g = TaskGraph::new();
        g.insert("a", json!("a"), vec![]);
        g.insert("b", json!("b"), vec!["a".into()]);
        g.insert("c", json!("c"), vec!["b".into()]);
        g
    }

    #[test]
    fn duplicate_insert_keeps_first_definition() {
        let mut g = TaskGraph::new();
        assert!(g.insert("a", json!("first"), vec![]));
        assert!(!g.insert("a", json!("second"), vec!["zzz".into()]));

        let node = g.node("a").unwrap();
        assert_eq!(node.payload, json!("first"));
        assert!(node.dependencies.is_empty());
        assert!(g.dependents_of("zzz").is_empty());
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn ready_set_follows_dependencies() {
        let mut g = chain();
        assert_eq!(g.ready_set(), vec!["a".to_string()]);

        g.complete("a", json!(1)).unwrap();
        assert_eq!(g.ready_set(), vec!["b".to_string()]);

        g.complete("b", json!(2)).unwrap();
        g.complete("c", json!(3)).unwrap();
        assert!(g.ready_set().is_empty());
        assert!(g.is_complete());
    }

    #[test]
    fn unknown_dependency_is_never_ready() {
        let mut g = TaskGraph::new();
        g.insert("x", json!("x"), vec!["ghost".into()]);
        assert!(g.ready_set().is_empty());

        let blocked = g.blocked();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].missing, vec!["ghost".to_string()]);

        // Arrives late: x becomes ready once ghost completes.
        g.insert("ghost", json!("g"), vec![]);
        assert_eq!(g.ready_set(), vec!["ghost".to_string()]);
        g.complete("ghost", json!(null)).unwrap();
        assert_eq!(g.ready_set(), vec!["x".to_string()]);
    }

    #[test]
    fn dependents_index_tracks_future_ids() {
        let mut g = TaskGraph::new();
        g.insert("b", json!("b"), vec!["a".into()]);
        g.insert("c", json!("c"), vec!["a".into()]);
        assert_eq!(g.dependents_of("a"), &["b".to_string(), "c".to_string()]);
        assert!(!g.contains("a"));
    }

    #[test]
    fn complete_unknown_node_errors() {
        let mut g = chain();
        match g.complete("nope", json!(null)) {
            Err(TaskmendError::UnknownNode(id)) => assert_eq!(id, "nope"),
            other => panic!("expected UnknownNode, got {other:?}"),
        }
    }

    #[test]
    fn completion_is_monotonic() {
        let mut g = chain();
        assert!(g.complete("a", json!("one")).unwrap());
        assert!(!g.complete("a", json!("two")).unwrap());
        assert_eq!(g.result_of("a"), Some(&json!("one")));
        assert!(g.is_node_completed("a"));
    }

    #[test]
    fn empty_graph_is_complete() {
        assert!(TaskGraph::new().is_complete());
        assert!(SharedGraph::default().is_complete());
    }

    #[test]
    fn shared_handles_see_the_same_graph() {
        let shared = SharedGraph::new(chain());
        let other = shared.clone();
        other.insert("d", json!("d"), vec![]);
        assert_eq!(shared.ready_set(), vec!["a".to_string(), "d".to_string()]);
    }
}
