// src/dag/stall.rs

//! Diagnostics for a run that cannot make progress.

use std::fmt;

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use crate::dag::graph::TaskGraph;
use crate::dag::task_info::BlockedNode;
use crate::engine::NodeId;

/// Why the graph is incomplete although nothing is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StallReport {
    /// Every incomplete node with the dependencies it is waiting on.
    pub blocked: Vec<BlockedNode>,
    /// Dependency cycles among incomplete nodes (each sorted by id).
    pub cycles: Vec<Vec<NodeId>>,
}

impl StallReport {
    pub fn new(graph: &TaskGraph, blocked: Vec<BlockedNode>) -> Self {
        let cycles = find_cycles(graph);
        Self { blocked, cycles }
    }

    pub fn blocked_ids(&self) -> Vec<&str> {
        self.blocked.iter().map(|b| b.id.as_str()).collect()
    }

    /// Dependency ids referenced by some blocked node but never inserted.
    pub fn missing_dependencies(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for b in &self.blocked {
            for m in &b.missing {
                if !out.contains(&m.as_str()) {
                    out.push(m);
                }
            }
        }
        out
    }
}

impl fmt::Display for StallReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} node(s) blocked", self.blocked.len())?;

        for b in &self.blocked {
            let unmet: Vec<&str> = b.unmet().map(|s| s.as_str()).collect();
            if unmet.is_empty() {
                write!(f, "; '{}'", b.id)?;
            } else {
                write!(f, "; '{}' waits on [{}]", b.id, unmet.join(", "))?;
            }
            if !b.missing.is_empty() {
                write!(f, " (never inserted: {})", b.missing.join(", "))?;
            }
            if let Some(fix) = &b.awaiting_fix {
                write!(f, " (awaiting fix '{fix}')")?;
            }
        }

        for cycle in &self.cycles {
            write!(f, "; cycle: {}", cycle.join(" -> "))?;
        }

        Ok(())
    }
}

/// Strongly connected components among incomplete nodes that form a cycle.
fn find_cycles(graph: &TaskGraph) -> Vec<Vec<NodeId>> {
    // Edge direction: dep -> node.
    let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();

    for node in graph.nodes().filter(|n| !n.is_completed()) {
        g.add_node(node.id.as_str());
        for dep in &node.dependencies {
            if graph.contains(dep) && !graph.is_node_completed(dep) {
                g.add_edge(dep.as_str(), node.id.as_str(), ());
            }
        }
    }

    let mut cycles: Vec<Vec<NodeId>> = tarjan_scc(&g)
        .into_iter()
        .filter(|scc| scc.len() > 1 || g.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let mut ids: Vec<NodeId> = scc.into_iter().map(str::to_string).collect();
            ids.sort();
            ids
        })
        .collect();
    cycles.sort();
    cycles
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn two_node_cycle_is_reported() {
        let mut g = TaskGraph::new();
        g.insert("A", json!("a"), vec!["B".into()]);
        g.insert("B", json!("b"), vec!["A".into()]);
        g.insert("C", json!("c"), vec!["A".into()]);

        let report = StallReport::new(&g, g.blocked());
        assert_eq!(report.blocked_ids(), vec!["A", "B", "C"]);
        assert_eq!(report.cycles, vec![vec!["A".to_string(), "B".to_string()]]);

        let text = report.to_string();
        assert!(text.contains("'A' waits on [B]"));
        assert!(text.contains("cycle: A -> B"));
    }

    #[test]
    fn self_dependency_counts_as_cycle() {
        let mut g = TaskGraph::new();
        g.insert("loop", json!(null), vec!["loop".into()]);
        let report = StallReport::new(&g, g.blocked());
        assert_eq!(report.cycles, vec![vec!["loop".to_string()]]);
    }

    #[test]
    fn dangling_dependency_is_named() {
        let mut g = TaskGraph::new();
        g.insert("deploy", json!(null), vec!["build".into()]);
        let report = StallReport::new(&g, g.blocked());
        assert!(report.cycles.is_empty());
        assert_eq!(report.missing_dependencies(), vec!["build"]);
        assert!(report.to_string().contains("never inserted: build"));
    }
}
