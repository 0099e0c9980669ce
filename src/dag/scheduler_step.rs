// src/dag/scheduler_step.rs

//! Result types for the scheduler's snapshot and completion steps.

use crate::dag::task_info::ReadyTask;
use crate::engine::NodeId;

/// Immutable snapshot of the nodes to dispatch in one cycle.
///
/// Nodes inserted after the snapshot was taken are not part of it; they are
/// picked up by the next call to [`Scheduler::next_batch`](crate::dag::Scheduler::next_batch).
#[derive(Debug, Clone, Default)]
pub struct ReadyBatch {
    pub cycle: u64,
    pub tasks: Vec<ReadyTask>,
}

impl ReadyBatch {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.id.as_str()).collect()
    }
}

/// Structured result of applying one outcome to the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStep {
    /// Nodes that transitioned to completed in this step, in order. A fix
    /// node completing also completes the node it was standing in for.
    pub newly_completed: Vec<NodeId>,
    /// Nodes inserted into the graph in this step.
    pub inserted: Vec<NodeId>,
    /// Whether the whole graph is complete after this step.
    pub graph_complete: bool,
}
